//! Whole-pass deadline and cancellation

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use svcmux_core::{
    DiscoveryError, DomainEvent, EndpointRegistry, EventBus, ServiceDescriptor, ServiceTimeouts,
};
use svcmux_gateway::DiscoveryEngine;
use tests::{FakeService, MockProber, ProtocolKind};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const DEADLINE: Duration = Duration::from_secs(5);

/// Per-probe timeout longer than the pass deadline, so hanging services are
/// cut off by the deadline rather than by their own probe timeout
fn slow_probe_service(name: &str, port: u16) -> ServiceDescriptor {
    ServiceDescriptor::new(name, ProtocolKind::RequestResponse, port).with_timeouts(
        ServiceTimeouts {
            probe_ms: 30_000,
            ..ServiceTimeouts::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_hanging_services_do_not_hold_up_discovery() {
    let names = ["comfyui", "a1111", "llm", "tts", "upscaler"];
    let descriptors: Vec<ServiceDescriptor> = names
        .iter()
        .enumerate()
        .map(|(i, name)| slow_probe_service(name, 9000 + i as u16))
        .collect();
    let fakes = vec![
        FakeService::new("comfyui"),
        FakeService::new("a1111"),
        FakeService::hanging("llm"),
        FakeService::hanging("tts"),
        FakeService::hanging("upscaler"),
    ];
    let registry = Arc::new(EndpointRegistry::new(descriptors));
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let engine = DiscoveryEngine::new(
        MockProber::new(fakes),
        Arc::clone(&registry),
        bus.sender(),
        DEADLINE,
    );

    let started = Instant::now();
    let report = engine.discover_all().await;

    assert!(started.elapsed() <= DEADLINE + Duration::from_millis(50));
    assert!(report.deadline_exceeded);
    assert_eq!(report.found(), vec!["a1111", "comfyui"]);
    assert_eq!(report.missing(), vec!["llm", "tts", "upscaler"]);
    assert_eq!(
        report.results["llm"],
        Err(DiscoveryError::DeadlineExceeded(DEADLINE))
    );

    // Found services are published; the others have no endpoint
    assert_eq!(registry.endpoint("comfyui").map(|e| e.port), Some(9000));
    assert_eq!(registry.endpoint("a1111").map(|e| e.port), Some(9001));
    assert!(registry.endpoint("llm").is_none());

    match rx.recv().await {
        Some(DomainEvent::DiscoveryCompleted {
            found,
            missing,
            deadline_exceeded,
            ..
        }) => {
            assert_eq!(found, vec!["a1111", "comfyui"]);
            assert_eq!(missing.len(), 3);
            assert!(deadline_exceeded);
        }
        other => panic!("expected DiscoveryCompleted, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_refused_default_port_falls_back_to_candidate() {
    let descriptor = ServiceDescriptor::new("comfyui", ProtocolKind::PersistentSocket, 8188)
        .with_candidate_ports([8189]);
    let fake = FakeService::new("comfyui");
    fake.listen_on(8189);
    let registry = Arc::new(EndpointRegistry::new(vec![descriptor.clone()]));
    let engine = DiscoveryEngine::new(
        MockProber::new([Arc::clone(&fake)]),
        registry,
        EventBus::new().sender(),
        DEADLINE,
    );

    let endpoint = engine.discover_service(&descriptor).await.unwrap();

    assert_eq!(endpoint.port, 8189);
    assert_eq!(fake.probes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_reports_unfinished_services_as_cancelled() {
    let registry = Arc::new(EndpointRegistry::new(vec![
        slow_probe_service("comfyui", 8188),
        slow_probe_service("llm", 4000),
    ]));
    let cancel = CancellationToken::new();
    let engine = DiscoveryEngine::new(
        MockProber::new([FakeService::new("comfyui"), FakeService::hanging("llm")]),
        registry,
        EventBus::new().sender(),
        DEADLINE,
    )
    .with_cancellation(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let report = engine.discover_all().await;
    canceller.await.unwrap();

    assert!(started.elapsed() < DEADLINE);
    assert!(!report.deadline_exceeded);
    assert!(report.endpoint("comfyui").is_some());
    assert_eq!(report.results["llm"], Err(DiscoveryError::Cancelled));
}
