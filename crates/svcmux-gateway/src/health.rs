//! Health Monitor
//!
//! Probes every service on a fixed interval, independently of pool usage, and
//! feeds the results into that service's `HealthTracker`. Only transitions are
//! published: to the event bus for observers, and in order to the service's
//! supervisor. The monitor never touches the pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use svcmux_core::{
    DomainEvent, EndpointRegistry, EventSender, HealthState, HealthTracker, ServiceDescriptor,
    TransportError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::probe::{bounded_probe, Prober};
use crate::reconnect::Trigger;

/// Health state of one service plus the channels its transitions go to
pub struct ServiceHealth {
    service: String,
    tracker: Mutex<HealthTracker>,
    last_contact: Mutex<Option<DateTime<Utc>>>,
    events: EventSender,
    triggers: Option<mpsc::UnboundedSender<Trigger>>,
}

impl ServiceHealth {
    pub fn new(
        service: impl Into<String>,
        unhealthy_threshold: u32,
        events: EventSender,
        triggers: Option<mpsc::UnboundedSender<Trigger>>,
    ) -> Self {
        Self {
            service: service.into(),
            tracker: Mutex::new(HealthTracker::new(unhealthy_threshold)),
            last_contact: Mutex::new(None),
            events,
            triggers,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> HealthState {
        self.tracker.lock().state()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.tracker.lock().consecutive_failures()
    }

    /// Last successful contact with the service
    pub fn last_contact(&self) -> Option<DateTime<Utc>> {
        *self.last_contact.lock()
    }

    /// Feed one probe outcome; returns the transitions it caused
    pub fn record_probe(
        &self,
        result: &Result<(), TransportError>,
    ) -> Vec<(HealthState, HealthState)> {
        let transitions = match result {
            Ok(()) => {
                *self.last_contact.lock() = Some(Utc::now());
                self.tracker.lock().record_success().into_iter().collect()
            }
            Err(e) => {
                trace!(service = %self.service, error = %e, "[Health] Probe failed");
                self.tracker.lock().record_failure()
            }
        };
        for &(old, new) in &transitions {
            self.publish(old, new);
        }
        transitions
    }

    /// Reconnection took over the service
    pub fn suspend(&self) {
        let transition = self.tracker.lock().suspend();
        if let Some((old, new)) = transition {
            self.publish(old, new);
        }
    }

    fn publish(&self, old: HealthState, new: HealthState) {
        match new {
            HealthState::Unhealthy => warn!(
                service = %self.service,
                from = old.as_str(),
                "[Health] Service unhealthy"
            ),
            HealthState::Healthy if old != HealthState::Unknown => info!(
                service = %self.service,
                from = old.as_str(),
                "[Health] Service recovered"
            ),
            _ => debug!(
                service = %self.service,
                from = old.as_str(),
                to = new.as_str(),
                "[Health] State changed"
            ),
        }

        self.events
            .emit(DomainEvent::health_changed(&self.service, old, new));

        let trigger = match new {
            HealthState::Unhealthy => Some(Trigger::Unhealthy),
            HealthState::Healthy => Some(Trigger::Recovered),
            _ => None,
        };
        if let (Some(trigger), Some(tx)) = (trigger, &self.triggers) {
            let _ = tx.send(trigger);
        }
    }
}

pub struct HealthMonitor {
    interval: Duration,
    prober: Arc<dyn Prober>,
    registry: Arc<EndpointRegistry>,
}

impl HealthMonitor {
    pub fn new(interval: Duration, prober: Arc<dyn Prober>, registry: Arc<EndpointRegistry>) -> Self {
        Self {
            interval,
            prober,
            registry,
        }
    }

    /// Probe once and feed the state machine ("test connection").
    ///
    /// A service without a discovered endpoint counts as a failed probe.
    pub async fn probe_now(
        &self,
        descriptor: &ServiceDescriptor,
        health: &ServiceHealth,
    ) -> Result<(), TransportError> {
        let result = match self.registry.endpoint(&descriptor.name) {
            Some(endpoint) => bounded_probe(self.prober.as_ref(), descriptor, &endpoint).await,
            None => Err(TransportError::NoEndpoint(descriptor.name.clone())),
        };
        health.record_probe(&result);
        result
    }

    /// Probe loop for one service. The first probe runs immediately.
    pub fn spawn(
        self: &Arc<Self>,
        descriptor: Arc<ServiceDescriptor>,
        health: Arc<ServiceHealth>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = monitor.probe_now(&descriptor, &health) => {}
                }
            }
            debug!(service = %descriptor.name, "[Health] Monitor stopped");
        })
    }
}
