//! Read-only service snapshots for status panels and other observers

use chrono::{DateTime, Utc};
use serde::Serialize;
use svcmux_core::{BreakerState, HealthState, LinkState, ProtocolKind, SuspendReason};

use crate::pool::PoolStats;

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub service: String,
    pub protocol: ProtocolKind,
    /// `host:port` of the discovered endpoint
    pub endpoint: Option<String>,
    pub health: HealthState,
    pub consecutive_failures: u32,
    pub last_contact: Option<DateTime<Utc>>,
    pub link: LinkState,
    pub draining: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend_reason: Option<SuspendReason>,
    pub retry: RetrySnapshot,
    pub breaker: BreakerSnapshot,
    pub pool: PoolStats,
    pub queue: QueueSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetrySnapshot {
    pub attempt: u32,
    pub max_attempts: u32,
    /// Base delay before the next attempt, without jitter
    pub next_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub depth: usize,
    pub capacity: usize,
}

/// Outcome of an on-demand "test connection" probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub service: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub health: HealthState,
    pub latency_ms: u64,
}
