//! Domain Events - Unified event system for SvcMux
//!
//! Every externally observable change is a `DomainEvent`. Events are emitted by
//! the runtime components and consumed by status panels, telemetry, and tests.
//!
//! Only transitions and terminal conditions become events; individual probe
//! results and routine acquire/release calls do not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{HealthState, LinkState, SuspendReason};

/// Unified domain events
///
/// # Serialization
///
/// Events serialize with a `type` field containing the snake_case variant name:
/// ```json
/// { "type": "health_changed", "service": "comfyui", "old": "healthy", "new": "degraded", "at": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ════════════════════════════════════════════════════════════════════════
    // HEALTH MONITOR
    // ════════════════════════════════════════════════════════════════════════
    /// Monitored health state changed
    HealthChanged {
        service: String,
        old: HealthState,
        new: HealthState,
        at: DateTime<Utc>,
    },

    // ════════════════════════════════════════════════════════════════════════
    // RECONNECTION SUPERVISOR
    // ════════════════════════════════════════════════════════════════════════
    /// Supervisor state changed
    LinkStateChanged {
        service: String,
        old: LinkState,
        new: LinkState,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        at: DateTime<Utc>,
    },

    /// Supervisor stopped retrying
    ServiceSuspended {
        service: String,
        reason: SuspendReason,
        message: String,
        at: DateTime<Utc>,
    },

    /// Queued operations were replayed after recovery
    OperationsReplayed {
        service: String,
        replayed: usize,
        requeued: usize,
        at: DateTime<Utc>,
    },

    // ════════════════════════════════════════════════════════════════════════
    // CONNECTION POOL
    // ════════════════════════════════════════════════════════════════════════
    /// A lent-out connection hit a transport error
    ConnectionFailed {
        service: String,
        connection_id: Uuid,
        error: String,
        at: DateTime<Utc>,
    },

    // ════════════════════════════════════════════════════════════════════════
    // DISCOVERY
    // ════════════════════════════════════════════════════════════════════════
    /// A discovery pass finished (possibly with partial results)
    DiscoveryCompleted {
        found: Vec<String>,
        missing: Vec<String>,
        deadline_exceeded: bool,
        at: DateTime<Utc>,
    },

    // ════════════════════════════════════════════════════════════════════════
    // HUB
    // ════════════════════════════════════════════════════════════════════════
    HubStarted {
        services: usize,
        at: DateTime<Utc>,
    },

    HubStopped {
        at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn health_changed(service: &str, old: HealthState, new: HealthState) -> Self {
        Self::HealthChanged {
            service: service.to_string(),
            old,
            new,
            at: Utc::now(),
        }
    }

    pub fn link_changed(
        service: &str,
        old: LinkState,
        new: LinkState,
        message: Option<String>,
    ) -> Self {
        Self::LinkStateChanged {
            service: service.to_string(),
            old,
            new,
            message,
            at: Utc::now(),
        }
    }

    /// Event type name, matching the serialized `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::HealthChanged { .. } => "health_changed",
            Self::LinkStateChanged { .. } => "link_state_changed",
            Self::ServiceSuspended { .. } => "service_suspended",
            Self::OperationsReplayed { .. } => "operations_replayed",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::DiscoveryCompleted { .. } => "discovery_completed",
            Self::HubStarted { .. } => "hub_started",
            Self::HubStopped { .. } => "hub_stopped",
        }
    }

    /// Service this event concerns, if it concerns exactly one
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::HealthChanged { service, .. }
            | Self::LinkStateChanged { service, .. }
            | Self::ServiceSuspended { service, .. }
            | Self::OperationsReplayed { service, .. }
            | Self::ConnectionFailed { service, .. } => Some(service),
            Self::DiscoveryCompleted { .. } | Self::HubStarted { .. } | Self::HubStopped { .. } => {
                None
            }
        }
    }

    /// When the event occurred
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::HealthChanged { at, .. }
            | Self::LinkStateChanged { at, .. }
            | Self::ServiceSuspended { at, .. }
            | Self::OperationsReplayed { at, .. }
            | Self::ConnectionFailed { at, .. }
            | Self::DiscoveryCompleted { at, .. }
            | Self::HubStarted { at, .. }
            | Self::HubStopped { at } => *at,
        }
    }
}
