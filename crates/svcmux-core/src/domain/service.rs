//! Service descriptors
//!
//! A `ServiceDescriptor` is loaded once at startup and never mutated. Every
//! per-service component (pool, health monitor, supervisor) reads its limits
//! and timeouts from here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default host for local services
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Transport family a service speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Long-lived message socket (handshake = TCP connect, liveness = ping)
    PersistentSocket,
    /// Stateless HTTP request/response, including long-poll job submission
    RequestResponse,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersistentSocket => "persistent_socket",
            Self::RequestResponse => "request_response",
        }
    }

    /// Whether a pooled connection must be pinged before reuse
    pub fn validates_on_reuse(&self) -> bool {
        matches!(self, Self::PersistentSocket)
    }
}

/// Per-service pool limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLimits {
    #[serde(default = "default_pool_min")]
    pub min: usize,
    #[serde(default = "default_pool_max")]
    pub max: usize,
}

const fn default_pool_min() -> usize {
    0
}

const fn default_pool_max() -> usize {
    4
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            min: default_pool_min(),
            max: default_pool_max(),
        }
    }
}

/// Per-service timeouts, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTimeouts {
    /// Timeout for a single discovery or health probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_ms: u64,
    /// Timeout for establishing a pooled connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_ms: u64,
    /// How long `acquire()` may wait for a free slot
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_ms: u64,
    /// Idle connections older than this are reaped
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_ms: u64,
    /// Timeout for executing one operation
    #[serde(default = "default_request_timeout_ms")]
    pub request_ms: u64,
}

const fn default_probe_timeout_ms() -> u64 {
    300
}

const fn default_connect_timeout_ms() -> u64 {
    2_000
}

const fn default_acquire_timeout_ms() -> u64 {
    5_000
}

const fn default_idle_timeout_ms() -> u64 {
    300_000 // 5 minutes
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ServiceTimeouts {
    fn default() -> Self {
        Self {
            probe_ms: default_probe_timeout_ms(),
            connect_ms: default_connect_timeout_ms(),
            acquire_ms: default_acquire_timeout_ms(),
            idle_ms: default_idle_timeout_ms(),
            request_ms: default_request_timeout_ms(),
        }
    }
}

impl ServiceTimeouts {
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn acquire(&self) -> Duration {
        Duration::from_millis(self.acquire_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

/// Reconnection backoff configuration.
///
/// Delay for attempt `n` is `initial * multiplier^n`, capped at `max`, plus
/// uniform jitter of up to `jitter_ratio` of that value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Must be >= 1.0
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Attempts before the supervisor gives up and suspends
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 0.0 disables jitter
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

const fn default_initial_delay_ms() -> u64 {
    1_000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_attempts() -> u32 {
    10
}

fn default_jitter_ratio() -> f64 {
    0.1
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Failures within `timeout_ms` that open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cooldown before the breaker allows a trial attempt
    #[serde(default = "default_breaker_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_breaker_timeout_ms() -> u64 {
    300_000 // 5 minutes
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_ms: default_breaker_timeout_ms(),
        }
    }
}

impl BreakerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Immutable description of one logical service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Logical name, unique across the configuration
    pub name: String,
    pub protocol: ProtocolKind,
    #[serde(default = "default_host")]
    pub host: String,
    pub default_port: u16,
    /// Probed in order after the default port
    #[serde(default)]
    pub candidate_ports: Vec<u16>,
    /// HTTP path probed for request-response services
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default)]
    pub pool: PoolLimits,
    #[serde(default)]
    pub timeouts: ServiceTimeouts,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub breaker: BreakerSettings,
    /// Capacity of the outage operation queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_health_path() -> String {
    "/".to_string()
}

const fn default_queue_capacity() -> usize {
    64
}

impl ServiceDescriptor {
    /// Create a descriptor with default limits and timeouts
    pub fn new(name: impl Into<String>, protocol: ProtocolKind, default_port: u16) -> Self {
        Self {
            name: name.into(),
            protocol,
            host: default_host(),
            default_port,
            candidate_ports: Vec::new(),
            health_path: default_health_path(),
            pool: PoolLimits::default(),
            timeouts: ServiceTimeouts::default(),
            retry: RetrySettings::default(),
            breaker: BreakerSettings::default(),
            queue_capacity: default_queue_capacity(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_candidate_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.candidate_ports = ports.into_iter().collect();
        self
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    pub fn with_pool(mut self, min: usize, max: usize) -> Self {
        self.pool = PoolLimits { min, max };
        self
    }

    pub fn with_timeouts(mut self, timeouts: ServiceTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerSettings) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Ports in probe order: default first, then candidates, without duplicates
    pub fn probe_ports(&self) -> Vec<u16> {
        let mut ports = Vec::with_capacity(1 + self.candidate_ports.len());
        ports.push(self.default_port);
        for port in &self.candidate_ports {
            if !ports.contains(port) {
                ports.push(*port);
            }
        }
        ports
    }
}
