//! # SvcMux Core Library
//!
//! Domain types and business rules for the SvcMux connectivity layer.
//!
//! ## Modules
//!
//! - `domain` - Service descriptors, endpoints, states, operations, events
//! - `config` - Layered configuration (defaults < profile < overrides)
//! - `registry` - Endpoint registry with copy-on-write replacement
//! - `resilience` - Retry policy, circuit breaker, operation queue, health tracker
//! - `event_bus` - Central event distribution system
//! - `error` - Error taxonomy shared by every component

pub mod config;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod registry;
pub mod resilience;

// Re-export commonly used types
pub use config::{
    default_profile_path, ConfigLayer, ConfigLoader, ConnectivityConfig, DiscoverySettings,
    HealthSettings, ServiceOverride,
};
pub use domain::*;
pub use error::{ConfigError, DiscoveryError, PoolError, SubmitError, TransportError};
pub use registry::EndpointRegistry;
pub use resilience::{
    BreakerState, CircuitBreaker, HealthTracker, OperationQueue, QueueFull, QueuedOperation,
    RetryPolicy,
};

// Event-driven architecture exports
pub use event_bus::{EventBus, EventReceiver, EventSender, SharedEventBus};
