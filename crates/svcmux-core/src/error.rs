//! Error taxonomy
//!
//! Unavailability is an expected condition, so every component returns typed
//! errors instead of panicking. Only transitions and terminal conditions are
//! surfaced to callers; transient failures are absorbed by the runtime.

use std::time::Duration;

use thiserror::Error;

/// Per-service discovery failure. Never fatal for the whole discovery call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// Every probed port refused or timed out
    #[error("service '{service}' not found on ports {ports:?}")]
    NotFound { service: String, ports: Vec<u16> },
    /// The overall discovery deadline elapsed before this service finished probing
    #[error("discovery deadline of {0:?} exceeded before service was probed")]
    DeadlineExceeded(Duration),
    #[error("discovery cancelled")]
    Cancelled,
}

/// Transport-level failure while connecting, probing, or executing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection refused by {0}")]
    Refused(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed by peer")]
    Closed,
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("i/o error: {0}")]
    Io(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("no endpoint discovered for service '{0}'")]
    NoEndpoint(String),
}

impl TransportError {
    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io(err.to_string())
    }
}

/// Connection pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No connection became free before the acquisition deadline (retryable)
    #[error("timed out after {0:?} waiting for a pooled connection")]
    AcquireTimeout(Duration),
    /// A connection failed validation or use (internal)
    #[error("connection invalid: {0}")]
    ConnectionInvalid(String),
    /// Creating a new connection failed
    #[error("failed to connect: {0}")]
    Connect(#[from] TransportError),
    /// The reconnection supervisor has suspended the pool
    #[error("pool suspended while service '{0}' reconnects")]
    Suspended(String),
    /// The pool is shutting down (terminal for this call)
    #[error("pool is shutting down")]
    ShuttingDown,
}

impl PoolError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AcquireTimeout(_) | Self::Suspended(_) | Self::Connect(_) | Self::ConnectionInvalid(_)
        )
    }
}

/// Errors returned by `submit()`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("unknown service '{0}'")]
    UnknownService(String),
    /// Outage queue is full; retry under the caller's own policy
    #[error("backpressure: operation queue for '{service}' is full ({capacity} pending)")]
    Backpressure { service: String, capacity: usize },
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("operation failed: {0}")]
    Transport(#[from] TransportError),
    #[error("shutting down")]
    ShuttingDown,
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backpressure { .. } | Self::Transport(_) => true,
            Self::Pool(e) => e.is_retryable(),
            Self::UnknownService(_) | Self::ShuttingDown => false,
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read profile {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("override for unknown service '{0}'")]
    UnknownService(String),
    #[error("duplicate service name '{0}'")]
    DuplicateService(String),
    #[error("invalid configuration for '{service}': {reason}")]
    Invalid { service: String, reason: String },
}
