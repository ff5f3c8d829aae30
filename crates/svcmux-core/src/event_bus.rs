//! Event Bus - Central event distribution system
//!
//! All domain events flow through this bus so producers (discovery, pool,
//! health monitor, supervisors) stay decoupled from consumers (status panels,
//! telemetry, tests).
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Event Bus (broadcast channel)                │
//! │                                                              │
//! │  Producers:                   Consumers:                     │
//! │  ├─ DiscoveryEngine           ├─ Status panel bridge         │
//! │  ├─ ConnectionPool            ├─ Telemetry exporter          │
//! │  ├─ HealthMonitor             └─ Tests                       │
//! │  └─ ServiceSupervisor                                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events from a single producer arrive in emission order. The supervisors do
//! not rely on this bus for their own triggers (a lagging receiver drops
//! events); they get a lossless per-service channel instead.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::DomainEvent;

/// Default channel capacity for the event bus
pub const DEFAULT_CAPACITY: usize = 256;

/// Event Bus - Central hub for domain event distribution
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Get a cheaply cloneable sender for emitting events
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Subscribe to all events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event Sender - Used by components to emit domain events
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventSender {
    /// Emit a domain event
    ///
    /// Returns the number of receivers. Zero subscribers is not an error.
    pub fn emit(&self, event: DomainEvent) -> usize {
        let type_name = event.type_name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(
                    event_type = type_name,
                    receivers = count,
                    "[EventBus] Emitted event"
                );
                count
            }
            Err(_) => {
                debug!(event_type = type_name, "[EventBus] No receivers for event");
                0
            }
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event Receiver - Used by consumers to receive domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event
    ///
    /// Returns `None` once the bus is dropped. Lag is logged and skipped.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "[EventBus] Receiver lagged, skipped {} events", skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[EventBus] Channel closed");
                    return None;
                }
            }
        }
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped_events = skipped, "[EventBus] Receiver lagged on try_recv");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Shared event bus handle
pub type SharedEventBus = Arc<EventBus>;
