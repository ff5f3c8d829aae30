//! SvcMux Gateway
//!
//! Runtime half of the connectivity layer:
//! - Discovery of local services across candidate ports
//! - Per-service connection pools with validation and idle reaping
//! - Health monitoring independent of pool usage
//! - Reconnection supervisors with backoff, circuit breaking and replay
//! - `ServiceHub`, the dependency-injected entry point for host applications

pub mod discovery;
pub mod health;
pub mod hub;
pub mod logging;
pub mod pool;
pub mod probe;
pub mod reconnect;
pub mod snapshot;
pub mod transport;

pub use discovery::{DiscoveryEngine, DiscoveryReport};
pub use health::{HealthMonitor, ServiceHealth};
pub use hub::{HubBuilder, ServiceHub};
pub use logging::{init_tracing, LoggingConfig, LoggingError};
pub use pool::{ConnectionPool, PoolStats, PooledConnection, PooledGuard, WaitHistogram};
pub use probe::{Prober, TransportProber};
pub use reconnect::{
    LinkStatus, QueuedReceipt, ServiceRuntime, ServiceSupervisor, SubmitOutcome, Trigger,
};
pub use snapshot::{BreakerSnapshot, ProbeReport, QueueSnapshot, RetrySnapshot, ServiceSnapshot};
pub use transport::{Connection, Transport, TransportFactory};
