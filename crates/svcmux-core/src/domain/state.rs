//! Per-service state enums
//!
//! `HealthState` is driven by the health monitor (with `Suspended` requested by
//! the reconnection supervisor). `LinkState` is the supervisor's own state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Monitored liveness of a service (the "connection state")
///
/// A first probe that fails moves `Unknown` straight to `Degraded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// No probe has completed yet
    #[default]
    Unknown,
    Healthy,
    /// At least one failed probe, below the unhealthy threshold
    Degraded,
    /// Consecutive failures reached the threshold
    Unhealthy,
    /// Reconnection supervisor is active for this service
    Suspended,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Suspended => "suspended",
        }
    }

    /// Whether `self -> next` is one of the defined edges
    pub fn can_transition_to(&self, next: HealthState) -> bool {
        use HealthState::*;
        matches!(
            (self, next),
            (Unknown, Healthy)
                | (Unknown, Degraded)
                | (Healthy, Degraded)
                | (Degraded, Unhealthy)
                | (Degraded, Healthy)
                | (Unhealthy, Healthy)
                | (Healthy, Suspended)
                | (Degraded, Suspended)
                | (Unhealthy, Suspended)
                | (Suspended, Healthy)
        )
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

/// Reconnection supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Connected,
    Disconnected,
    Reconnecting,
    Suspended,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Suspended => "suspended",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Why a supervisor stopped retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuspendReason {
    /// Breaker is open; a trial attempt follows after `retry_in`
    CircuitOpen {
        #[serde(with = "duration_ms")]
        retry_in: Duration,
    },
    /// `max_attempts` reached; only a manual reconnect resumes
    RetriesExhausted,
}

impl SuspendReason {
    /// User-facing summary, e.g. "service suspended, retry in 42 seconds"
    pub fn message(&self) -> String {
        match self {
            Self::CircuitOpen { retry_in } => format!(
                "service suspended, retry in {} seconds",
                retry_in.as_secs_f64().ceil() as u64
            ),
            Self::RetriesExhausted => {
                "service suspended, retries exhausted; manual reconnect required".to_string()
            }
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
