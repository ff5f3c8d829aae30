//! Probe schedule and state machine

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use svcmux_core::{Endpoint, EndpointRegistry, EventBus, EventReceiver};
use svcmux_gateway::{HealthMonitor, ServiceHealth, Trigger};
use tests::events::{drain, health_edges};
use tests::{FakeService, HealthState, MockProber, ProtocolKind, ServiceDescriptor};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(30);

struct Fixture {
    fake: Arc<FakeService>,
    health: Arc<ServiceHealth>,
    triggers: mpsc::UnboundedReceiver<Trigger>,
    events: EventReceiver,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// Monitor for one discovered service, threshold 3, probing every 30s
fn spawn_monitor() -> Fixture {
    let descriptor = ServiceDescriptor::new("llm", ProtocolKind::RequestResponse, 4000);
    let registry = Arc::new(EndpointRegistry::new(vec![descriptor.clone()]));
    registry.publish([Endpoint::for_descriptor(&descriptor, 4000)]);
    let fake = FakeService::new("llm");

    let bus = EventBus::new();
    let events = bus.subscribe();
    let (tx, triggers) = mpsc::unbounded_channel();
    let health = Arc::new(ServiceHealth::new("llm", 3, bus.sender(), Some(tx)));
    let monitor = Arc::new(HealthMonitor::new(
        INTERVAL,
        MockProber::new([Arc::clone(&fake)]),
        registry,
    ));
    let cancel = CancellationToken::new();
    let task = monitor.spawn(Arc::new(descriptor), Arc::clone(&health), cancel.clone());

    Fixture {
        fake,
        health,
        triggers,
        events,
        cancel,
        task,
    }
}

#[tokio::test(start_paused = true)]
async fn test_three_failed_probes_make_service_unhealthy() {
    let mut fx = spawn_monitor();

    // First probe runs immediately
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fx.health.state(), HealthState::Healthy);
    assert_eq!(fx.triggers.try_recv().ok(), Some(Trigger::Recovered));

    fx.fake.set_up(false);

    tokio::time::sleep(INTERVAL).await; // t = 31s
    assert_eq!(fx.health.state(), HealthState::Degraded);
    assert_eq!(fx.health.consecutive_failures(), 1);

    tokio::time::sleep(INTERVAL).await; // t = 61s
    assert_eq!(fx.health.state(), HealthState::Degraded);
    assert_eq!(fx.health.consecutive_failures(), 2);
    assert!(fx.triggers.try_recv().is_err(), "no trigger while degraded");

    tokio::time::sleep(INTERVAL).await; // t = 91s
    assert_eq!(fx.health.state(), HealthState::Unhealthy);
    assert_eq!(fx.health.consecutive_failures(), 3);
    assert_eq!(fx.triggers.try_recv().ok(), Some(Trigger::Unhealthy));

    let events = drain(&mut fx.events);
    assert_eq!(
        health_edges(&events, "llm"),
        vec![
            (HealthState::Unknown, HealthState::Healthy),
            (HealthState::Healthy, HealthState::Degraded),
            (HealthState::Degraded, HealthState::Unhealthy),
        ]
    );

    fx.cancel.cancel();
    fx.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_single_success_recovers_from_unhealthy() {
    let mut fx = spawn_monitor();
    fx.fake.set_up(false);

    tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(1)).await; // probes at 0, 30, 60
    assert_eq!(fx.health.state(), HealthState::Unhealthy);
    let before = fx.health.last_contact();
    assert!(before.is_none(), "never reached");

    fx.fake.set_up(true);
    tokio::time::sleep(INTERVAL).await;

    assert_eq!(fx.health.state(), HealthState::Healthy);
    assert_eq!(fx.health.consecutive_failures(), 0);
    assert!(fx.health.last_contact().is_some());
    let triggers: Vec<Trigger> = std::iter::from_fn(|| fx.triggers.try_recv().ok()).collect();
    assert_eq!(triggers, vec![Trigger::Unhealthy, Trigger::Recovered]);

    fx.cancel.cancel();
    fx.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failures_while_suspended_are_absorbed() {
    let mut fx = spawn_monitor();
    tokio::time::sleep(Duration::from_secs(1)).await;
    fx.health.suspend();
    assert_eq!(fx.health.state(), HealthState::Suspended);
    drain(&mut fx.events);

    fx.fake.set_up(false);
    tokio::time::sleep(INTERVAL * 3).await;

    assert_eq!(fx.health.state(), HealthState::Suspended);
    assert!(health_edges(&drain(&mut fx.events), "llm").is_empty());

    fx.fake.set_up(true);
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(fx.health.state(), HealthState::Healthy);

    fx.cancel.cancel();
    fx.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_probes_ignore_pool_activity() {
    let fx = spawn_monitor();
    tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(1)).await;

    // One probe per tick, nothing else
    assert_eq!(fx.fake.probes(), 3);
    assert_eq!(fx.fake.connects(), 0);

    fx.cancel.cancel();
    fx.task.await.unwrap();
}
