//! Queueing during an outage and replay after recovery

use std::time::Duration;

use pretty_assertions::assert_eq;
use svcmux_core::SubmitError;
use svcmux_gateway::SubmitOutcome;
use tests::fixtures::{retry, socket_service};
use tests::{
    ConnectivityConfig, DomainEvent, HealthState, HubHarness, LinkState, Operation,
};

#[tokio::test(start_paused = true)]
async fn test_queued_operations_replay_in_order_after_recovery() {
    let mut h = HubHarness::new(vec![socket_service("comfyui")]);
    h.start().await;
    let svc = h.service("comfyui");
    svc.set_up(false);

    let ops: Vec<Operation> = (0u8..3).map(|i| Operation::new(vec![i])).collect();
    let mut receipts = Vec::new();
    for op in &ops {
        match h.hub.submit("comfyui", op.clone()).await.unwrap() {
            SubmitOutcome::Queued(receipt) => receipts.push(receipt),
            SubmitOutcome::Completed(_) => panic!("service is down"),
        }
    }
    let positions: Vec<usize> = receipts.iter().map(|r| r.position()).collect();
    assert_eq!(positions, vec![1, 2, 3]);

    // Still inside the first 1s backoff
    tokio::time::sleep(Duration::from_millis(500)).await;
    let snap = h.snapshot("comfyui");
    assert_eq!(snap.link, LinkState::Reconnecting);
    assert_eq!(snap.health, HealthState::Suspended);
    assert_eq!(snap.queue.depth, 3);
    assert!(snap.pool.suspended);

    svc.set_up(true);
    for (receipt, op) in receipts.into_iter().zip(&ops) {
        let response = receipt.wait().await.unwrap();
        assert_eq!(response.operation_id, op.id);
        assert_eq!(response.body, op.payload);
    }
    let expected: Vec<_> = ops.iter().map(|op| op.id).collect();
    assert_eq!(svc.executed(), expected, "replayed in submission order");

    let event = h
        .wait_for(Duration::from_secs(5), |e| {
            matches!(e, DomainEvent::OperationsReplayed { .. })
        })
        .await;
    assert!(matches!(
        event,
        Some(DomainEvent::OperationsReplayed { replayed: 3, requeued: 0, .. })
    ));

    let snap = h.snapshot("comfyui");
    assert_eq!(snap.link, LinkState::Connected);
    assert!(!snap.draining);
    assert_eq!(snap.queue.depth, 0);
    assert_eq!(snap.retry.attempt, 0);
    assert_eq!(snap.health, HealthState::Healthy);

    h.hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_rejects_with_backpressure() {
    let descriptor = socket_service("comfyui")
        .with_queue_capacity(2)
        .with_retry(retry(60_000, 2.0, 60_000, 10));
    let h = HubHarness::new(vec![descriptor]);
    h.start().await;
    h.service("comfyui").set_up(false);

    let first = h.hub.submit("comfyui", Operation::new("a")).await.unwrap();
    let second = h.hub.submit("comfyui", Operation::new("b")).await.unwrap();
    assert!(first.is_queued());
    assert!(second.is_queued());

    let err = h
        .hub
        .submit("comfyui", Operation::new("c"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SubmitError::Backpressure {
            service: "comfyui".to_string(),
            capacity: 2,
        }
    );
    assert!(err.is_retryable());
    assert_eq!(h.snapshot("comfyui").queue.depth, 2);

    h.hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_new_submissions_queue_behind_replay() {
    let mut h = HubHarness::new(vec![socket_service("comfyui")]);
    h.start().await;
    let svc = h.service("comfyui");
    svc.set_up(false);

    let early = Operation::new("early");
    let SubmitOutcome::Queued(early_receipt) = h.hub.submit("comfyui", early.clone()).await.unwrap()
    else {
        panic!("service is down");
    };

    svc.set_up(true);
    h.wait_for(Duration::from_secs(5), |e| {
        matches!(e, DomainEvent::LinkStateChanged { new: LinkState::Connected, .. })
    })
    .await
    .expect("reconnected");
    early_receipt.wait().await.unwrap();

    let late = Operation::new("late");
    let outcome = h.hub.submit("comfyui", late.clone()).await.unwrap();
    assert!(!outcome.is_queued(), "drained link executes directly");
    assert_eq!(svc.executed(), vec![early.id, late.id]);

    h.hub.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_probe_triggers_reconnection() {
    let mut config = ConnectivityConfig::new(vec![socket_service("comfyui")]);
    config.health.interval_ms = 30_000;
    config.health.unhealthy_threshold = 3;
    let mut h = HubHarness::with_config(config);
    h.start().await;
    let svc = h.service("comfyui");
    assert_eq!(h.snapshot("comfyui").health, HealthState::Healthy);

    svc.set_up(false);
    let disconnected = h
        .wait_for(Duration::from_secs(120), |e| {
            matches!(e, DomainEvent::LinkStateChanged { new: LinkState::Disconnected, .. })
        })
        .await;
    assert!(disconnected.is_some(), "third failed probe starts recovery");
    assert_eq!(h.snapshot("comfyui").health, HealthState::Suspended);

    svc.set_up(true);
    let connected = h
        .wait_for(Duration::from_secs(120), |e| {
            matches!(e, DomainEvent::LinkStateChanged { new: LinkState::Connected, .. })
        })
        .await;
    assert!(connected.is_some());
    assert_eq!(h.snapshot("comfyui").health, HealthState::Healthy);

    h.hub.shutdown().await;
}
