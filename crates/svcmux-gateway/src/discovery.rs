//! Discovery Engine
//!
//! Probes each service's ports (default first, then candidates, in order) and
//! publishes the live endpoints into the registry. All services are probed
//! concurrently; the whole pass is bounded by one deadline, and whatever has
//! finished by then is the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use svcmux_core::{
    DiscoveryError, DomainEvent, Endpoint, EndpointRegistry, EventSender, ServiceDescriptor,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::probe::{bounded_probe, Prober};

/// Outcome of one discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub results: HashMap<String, Result<Endpoint, DiscoveryError>>,
    pub deadline_exceeded: bool,
    pub elapsed: Duration,
}

impl DiscoveryReport {
    pub fn endpoint(&self, service: &str) -> Option<&Endpoint> {
        self.results.get(service).and_then(|r| r.as_ref().ok())
    }

    /// Services that were found, sorted
    pub fn found(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .results
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Services that were not found, sorted
    pub fn missing(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

pub struct DiscoveryEngine {
    prober: Arc<dyn Prober>,
    registry: Arc<EndpointRegistry>,
    events: EventSender,
    deadline: Duration,
    cancel: CancellationToken,
}

impl DiscoveryEngine {
    pub fn new(
        prober: Arc<dyn Prober>,
        registry: Arc<EndpointRegistry>,
        events: EventSender,
        deadline: Duration,
    ) -> Self {
        Self {
            prober,
            registry,
            events,
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie in-flight discovery to an outer lifetime
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Discover every service in the registry
    pub async fn discover_all(&self) -> DiscoveryReport {
        let descriptors = self.registry.descriptors();
        self.discover(&descriptors).await
    }

    /// Probe the given services concurrently and publish what was found.
    ///
    /// Returns within the deadline regardless of individual probe behaviour.
    /// Services still probing at the deadline get `DeadlineExceeded`.
    pub async fn discover(&self, descriptors: &[Arc<ServiceDescriptor>]) -> DiscoveryReport {
        let started = Instant::now();
        let deadline = started + self.deadline;

        let mut pending: FuturesUnordered<_> = descriptors
            .iter()
            .map(|descriptor| {
                let descriptor = Arc::clone(descriptor);
                async move {
                    let result = self.discover_service(&descriptor).await;
                    (descriptor.name.clone(), result)
                }
            })
            .collect();

        let mut results = HashMap::with_capacity(descriptors.len());
        let mut deadline_exceeded = false;
        let mut cancelled = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    deadline_exceeded = true;
                    break;
                }
                next = pending.next() => match next {
                    Some((name, result)) => {
                        results.insert(name, result);
                    }
                    None => break,
                },
            }
        }
        drop(pending);

        for descriptor in descriptors {
            results.entry(descriptor.name.clone()).or_insert_with(|| {
                if cancelled {
                    Err(DiscoveryError::Cancelled)
                } else {
                    Err(DiscoveryError::DeadlineExceeded(self.deadline))
                }
            });
        }

        let report = DiscoveryReport {
            results,
            deadline_exceeded,
            elapsed: started.elapsed(),
        };

        let published = self.registry.publish(
            report
                .results
                .values()
                .filter_map(|r| r.as_ref().ok().cloned()),
        );

        let found = report.found();
        let missing = report.missing();
        if deadline_exceeded {
            warn!(
                deadline_ms = self.deadline.as_millis() as u64,
                missing = ?missing,
                "[Discovery] Deadline exceeded, returning partial results"
            );
        }
        info!(
            found = found.len(),
            missing = missing.len(),
            published,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "[Discovery] Pass complete"
        );

        self.events.emit(DomainEvent::DiscoveryCompleted {
            found,
            missing,
            deadline_exceeded,
            at: chrono::Utc::now(),
        });

        report
    }

    /// Probe one service's ports in order; the first live port wins
    pub async fn discover_service(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Endpoint, DiscoveryError> {
        let ports = descriptor.probe_ports();
        for &port in &ports {
            let candidate = Endpoint::for_descriptor(descriptor, port);
            match bounded_probe(self.prober.as_ref(), descriptor, &candidate).await {
                Ok(()) => {
                    debug!(
                        service = %descriptor.name,
                        port,
                        "[Discovery] Service found"
                    );
                    return Ok(candidate);
                }
                Err(e) => {
                    debug!(
                        service = %descriptor.name,
                        port,
                        error = %e,
                        "[Discovery] Port not live"
                    );
                }
            }
        }
        Err(DiscoveryError::NotFound {
            service: descriptor.name.clone(),
            ports,
        })
    }

    /// Rediscover a single service and publish it if found
    pub async fn rediscover(&self, descriptor: &ServiceDescriptor) -> Option<Endpoint> {
        let endpoint = self.discover_service(descriptor).await.ok()?;
        self.registry.publish([endpoint.clone()]);
        Some(endpoint)
    }

    /// Run `discover_all` every `interval` until cancelled
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; the initial pass is run by the caller
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("[Discovery] Periodic rediscovery");
                        self.discover_all().await;
                    }
                }
            }
            debug!("[Discovery] Periodic rediscovery stopped");
        })
    }
}
