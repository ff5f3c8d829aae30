//! Reconnection Engine
//!
//! One `ServiceSupervisor` task per service runs the link state machine:
//!
//! ```text
//!   Connected ──trigger──▶ Disconnected ──breaker open──▶ Suspended(circuit)
//!       ▲                       │                              │ cooldown
//!       │                       ▼                              ▼
//!       └──── success ──── Reconnecting ◀──────────────────────┘
//!                               │ max attempts
//!                               ▼
//!                      Suspended(exhausted) ──manual──▶ Reconnecting
//! ```
//!
//! Triggers arrive over a per-service unbounded channel so none are lost and
//! they are handled in the order produced. Operations submitted while the
//! link is not `Connected` wait in the service's `OperationQueue` and are
//! replayed FIFO once it is.

mod runtime;
mod supervisor;

use uuid::Uuid;

pub use runtime::{LinkStatus, QueuedReceipt, ServiceRuntime, SubmitOutcome};
pub use supervisor::ServiceSupervisor;

/// Input to a supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Health monitor saw the service become Unhealthy
    Unhealthy,
    /// Health monitor saw a successful probe after a non-healthy state
    Recovered,
    /// A pooled connection failed while in use (nil id: failed to connect)
    ConnectionFailed { connection_id: Uuid, error: String },
    /// Operator asked for an immediate retry
    ManualReconnect,
}
