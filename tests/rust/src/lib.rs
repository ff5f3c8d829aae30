//! Shared test utilities and fixtures for SvcMux integration tests.

pub use svcmux_core::{
    BreakerSettings, ConnectivityConfig, DomainEvent, HealthState, LinkState, Operation,
    ProtocolKind, RetrySettings, ServiceDescriptor, ServiceTimeouts, SuspendReason,
};

pub use mocks::{FakeService, MockProber, MockTransport};

pub use services::{settle, HubHarness};

/// Event testing utilities
pub mod events {
    use std::time::Duration;

    use svcmux_core::{DomainEvent, EventReceiver};

    /// Collect events until `timeout` passes without the channel closing
    pub async fn collect_events(rx: &mut EventReceiver, timeout: Duration) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => break, // Bus dropped
                Err(_) => break,   // Timeout
            }
        }

        events
    }

    /// Wait for a specific event
    pub async fn wait_for_event<F>(
        rx: &mut EventReceiver,
        timeout: Duration,
        predicate: F,
    ) -> Option<DomainEvent>
    where
        F: Fn(&DomainEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(event)) if predicate(&event) => return Some(event),
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(_) => return None,
            }
        }
    }

    /// Drain whatever is already buffered
    pub fn drain(rx: &mut EventReceiver) -> Vec<DomainEvent> {
        std::iter::from_fn(|| rx.try_recv()).collect()
    }

    /// `(old, new)` pairs of every health change for `service`
    pub fn health_edges(
        events: &[DomainEvent],
        service: &str,
    ) -> Vec<(svcmux_core::HealthState, svcmux_core::HealthState)> {
        events
            .iter()
            .filter_map(|e| match e {
                DomainEvent::HealthChanged {
                    service: s,
                    old,
                    new,
                    ..
                } if s == service => Some((*old, *new)),
                _ => None,
            })
            .collect()
    }

    /// Sequence of link states entered by `service`
    pub fn link_states(events: &[DomainEvent], service: &str) -> Vec<svcmux_core::LinkState> {
        events
            .iter()
            .filter_map(|e| match e {
                DomainEvent::LinkStateChanged { service: s, new, .. } if s == service => {
                    Some(*new)
                }
                _ => None,
            })
            .collect()
    }
}

/// Descriptor fixtures
pub mod fixtures {
    use svcmux_core::{
        BreakerSettings, ProtocolKind, RetrySettings, ServiceDescriptor, ServiceTimeouts,
    };

    /// Deterministic backoff: no jitter
    pub fn retry(initial_ms: u64, multiplier: f64, max_ms: u64, max_attempts: u32) -> RetrySettings {
        RetrySettings {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            multiplier,
            max_attempts,
            jitter_ratio: 0.0,
        }
    }

    /// Breaker that never opens in practice
    pub fn lenient_breaker() -> BreakerSettings {
        BreakerSettings {
            failure_threshold: 1_000,
            timeout_ms: 300_000,
        }
    }

    /// Socket service with a jitter-free 1s/2x backoff
    pub fn socket_service(name: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, ProtocolKind::PersistentSocket, 9000)
            .with_pool(0, 2)
            .with_retry(retry(1_000, 2.0, 60_000, 10))
            .with_breaker(lenient_breaker())
            .with_timeouts(ServiceTimeouts {
                acquire_ms: 1_000,
                ..ServiceTimeouts::default()
            })
    }
}
