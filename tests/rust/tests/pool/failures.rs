//! Failed connections are destroyed and reported, never recycled

use std::sync::Arc;

use svcmux_core::{DomainEvent, Endpoint, EndpointRegistry, EventBus, PoolError, TransportError};
use svcmux_gateway::{ConnectionPool, Trigger};
use tests::fixtures::socket_service;
use tests::{FakeService, MockTransport, Operation};
use tokio::sync::mpsc;

struct Fixture {
    fake: Arc<FakeService>,
    pool: ConnectionPool,
    triggers: mpsc::UnboundedReceiver<Trigger>,
    events: svcmux_core::EventReceiver,
}

fn fixture() -> Fixture {
    let descriptor = socket_service("comfyui").with_pool(0, 2);
    let registry = Arc::new(EndpointRegistry::new(vec![descriptor.clone()]));
    registry.publish([Endpoint::for_descriptor(&descriptor, 9000)]);
    let fake = FakeService::new("comfyui");
    let bus = EventBus::new();
    let events = bus.subscribe();
    let (tx, triggers) = mpsc::unbounded_channel();
    let pool = ConnectionPool::new(
        Arc::new(descriptor),
        registry,
        MockTransport::new(Arc::clone(&fake)),
        bus.sender(),
        Some(tx),
    );
    Fixture {
        fake,
        pool,
        triggers,
        events,
    }
}

#[tokio::test]
async fn test_failed_execute_destroys_connection_and_signals() {
    let mut fx = fixture();
    let mut guard = fx.pool.acquire().await.unwrap();
    let conn_id = guard.id();

    fx.fake.set_up(false);
    let err = guard.execute(&Operation::new("job")).await.unwrap_err();
    assert_eq!(err, TransportError::Closed);
    assert!(guard.is_failed());
    drop(guard);

    let stats = fx.pool.stats();
    assert_eq!(stats.idle, 0, "failed connection must not return to idle");
    assert_eq!(stats.destroyed, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(fx.fake.live(), 0);

    match fx.triggers.try_recv() {
        Ok(Trigger::ConnectionFailed { connection_id, .. }) => assert_eq!(connection_id, conn_id),
        other => panic!("expected ConnectionFailed trigger, got {other:?}"),
    }
    assert!(matches!(
        fx.events.try_recv(),
        Some(DomainEvent::ConnectionFailed { connection_id, .. }) if connection_id == conn_id
    ));
}

#[tokio::test]
async fn test_dead_idle_connection_is_not_lent() {
    let fx = fixture();
    drop(fx.pool.acquire().await.unwrap());
    assert_eq!(fx.pool.stats().idle, 1);

    fx.fake.set_up(false);
    let err = fx.pool.acquire().await.unwrap_err();

    assert!(matches!(err, PoolError::Connect(TransportError::Refused(_))));
    let stats = fx.pool.stats();
    assert_eq!(stats.destroyed, 1, "idle connection failed its ping");
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.in_use, 0);
}

#[tokio::test]
async fn test_suspended_pool_refuses_until_resumed() {
    let fx = fixture();
    drop(fx.pool.acquire().await.unwrap());
    assert_eq!(fx.pool.stats().idle, 1);

    fx.pool.suspend();
    assert_eq!(fx.pool.stats().idle, 0, "suspend destroys idle connections");
    assert_eq!(
        fx.pool.acquire().await.unwrap_err(),
        PoolError::Suspended("comfyui".to_string())
    );

    fx.pool.establish().await.unwrap();
    fx.pool.resume();
    let guard = fx.pool.acquire().await.unwrap();
    assert_eq!(fx.pool.stats().reused, 1);
    drop(guard);
}

#[tokio::test]
async fn test_shutdown_refuses_new_borrowers() {
    let fx = fixture();
    let guard = fx.pool.acquire().await.unwrap();

    fx.pool.shutdown();
    assert_eq!(fx.pool.acquire().await.unwrap_err(), PoolError::ShuttingDown);

    drop(guard);
    let stats = fx.pool.stats();
    assert_eq!(stats.idle, 0, "returned connections are destroyed after shutdown");
    assert_eq!(fx.fake.live(), 0);
}
