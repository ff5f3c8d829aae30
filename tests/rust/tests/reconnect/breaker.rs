//! Circuit breaker: 5 failures within the window suspend for the cooldown

use std::time::Duration;

use pretty_assertions::assert_eq;
use svcmux_core::BreakerState;
use tests::fixtures::{retry, socket_service};
use tests::{BreakerSettings, DomainEvent, HubHarness, LinkState, Operation, SuspendReason};

const COOLDOWN: Duration = Duration::from_secs(300);

fn breaker_hub() -> HubHarness {
    HubHarness::new(vec![socket_service("comfyui")
        .with_retry(retry(1_000, 1.0, 1_000, 100))
        .with_breaker(BreakerSettings {
            failure_threshold: 5,
            timeout_ms: COOLDOWN.as_millis() as u64,
        })])
}

#[tokio::test(start_paused = true)]
async fn test_fifth_failure_opens_breaker_for_cooldown() {
    let mut h = breaker_hub();
    h.start().await;
    let svc = h.service("comfyui");
    svc.set_up(false);

    h.hub.submit("comfyui", Operation::new("job")).await.unwrap();

    let suspended = h
        .wait_for(Duration::from_secs(60), |e| {
            matches!(e, DomainEvent::ServiceSuspended { .. })
        })
        .await;
    match suspended {
        Some(DomainEvent::ServiceSuspended {
            reason, message, ..
        }) => {
            assert_eq!(reason, SuspendReason::CircuitOpen { retry_in: COOLDOWN });
            assert_eq!(message, "service suspended, retry in 300 seconds");
        }
        other => panic!("expected ServiceSuspended, got {other:?}"),
    }
    // Failed submit plus four reconnect attempts
    assert_eq!(svc.connects(), 5);

    let snap = h.snapshot("comfyui");
    assert_eq!(snap.link, LinkState::Suspended);
    assert_eq!(snap.breaker.state, BreakerState::Open);
    assert_eq!(snap.breaker.failure_count, 5);

    // No attempts while open
    tokio::time::sleep(COOLDOWN - Duration::from_secs(10)).await;
    assert_eq!(svc.connects(), 5);

    // Half-open trial after the cooldown succeeds and closes the breaker
    svc.set_up(true);
    let connected = h
        .wait_for(Duration::from_secs(60), |e| {
            matches!(e, DomainEvent::LinkStateChanged { new: LinkState::Connected, .. })
        })
        .await;
    assert!(connected.is_some());
    tests::settle().await;
    assert_eq!(svc.connects(), 6);

    let snap = h.snapshot("comfyui");
    assert_eq!(snap.breaker.state, BreakerState::Closed);
    assert_eq!(snap.breaker.failure_count, 0);
    assert_eq!(snap.queue.depth, 0);

    h.hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens_breaker() {
    let mut h = breaker_hub();
    h.start().await;
    let svc = h.service("comfyui");
    svc.set_up(false);

    h.hub.submit("comfyui", Operation::new("job")).await.unwrap();
    h.wait_for(Duration::from_secs(60), |e| {
        matches!(e, DomainEvent::ServiceSuspended { .. })
    })
    .await
    .expect("breaker opened");

    // Trial at the end of the cooldown fails: open again for a full cooldown
    let reopened = h
        .wait_for(COOLDOWN + Duration::from_secs(60), |e| {
            matches!(e, DomainEvent::ServiceSuspended { .. })
        })
        .await;
    assert!(matches!(
        reopened,
        Some(DomainEvent::ServiceSuspended {
            reason: SuspendReason::CircuitOpen { retry_in },
            ..
        }) if retry_in == COOLDOWN
    ));
    assert_eq!(svc.connects(), 6);
    assert_eq!(h.snapshot("comfyui").breaker.state, BreakerState::Open);

    h.hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_overrides_open_breaker() {
    let mut h = breaker_hub();
    h.start().await;
    let svc = h.service("comfyui");
    svc.set_up(false);

    h.hub.submit("comfyui", Operation::new("job")).await.unwrap();
    h.wait_for(Duration::from_secs(60), |e| {
        matches!(e, DomainEvent::ServiceSuspended { .. })
    })
    .await
    .expect("breaker opened");

    svc.set_up(true);
    h.hub.force_reconnect("comfyui").unwrap();
    let connected = h
        .wait_for(Duration::from_secs(5), |e| {
            matches!(e, DomainEvent::LinkStateChanged { new: LinkState::Connected, .. })
        })
        .await;
    assert!(connected.is_some(), "reconnected without waiting out the cooldown");
    assert_eq!(h.snapshot("comfyui").breaker.state, BreakerState::Closed);

    h.hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_clears_failure_count() {
    let h = breaker_hub();
    h.start().await;
    let svc = h.service("comfyui");
    svc.set_up(false);

    // Failed submit at 0s, failed attempts at 1s, 2s and 3s
    let receipt = match h.hub.submit("comfyui", Operation::new("job")).await.unwrap() {
        svcmux_gateway::SubmitOutcome::Queued(receipt) => receipt,
        other => panic!("service is down: {other:?}"),
    };
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(h.snapshot("comfyui").breaker.failure_count, 4);

    svc.set_up(true);
    receipt.wait().await.unwrap();
    tests::settle().await;
    let snap = h.snapshot("comfyui");
    assert_eq!(snap.link, LinkState::Connected);
    assert_eq!(snap.breaker.state, BreakerState::Closed);
    assert_eq!(snap.breaker.failure_count, 0);

    // A single later failure must not open the breaker
    svc.set_up(false);
    h.hub.submit("comfyui", Operation::new("next")).await.unwrap();
    tests::settle().await;
    let snap = h.snapshot("comfyui");
    assert_eq!(snap.breaker.failure_count, 1);
    assert_eq!(snap.breaker.state, BreakerState::Closed);
    assert_eq!(snap.link, LinkState::Reconnecting);
    assert_eq!(snap.suspend_reason, None);

    h.hub.shutdown().await;
}
