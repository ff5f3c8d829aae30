//! Domain entities, value objects, and events
//!
//! - Descriptors (ServiceDescriptor and its settings blocks)
//! - Endpoints (resolved host/port/protocol triples)
//! - States (HealthState, LinkState, SuspendReason)
//! - Operations (opaque payloads submitted by the host application)
//! - Domain Events (DomainEvent enum for event-driven architecture)

mod endpoint;
mod event;
mod operation;
mod service;
mod state;

pub use endpoint::Endpoint;
pub use event::DomainEvent;
pub use operation::{Operation, OperationResponse};
pub use service::{
    BreakerSettings, PoolLimits, ProtocolKind, RetrySettings, ServiceDescriptor, ServiceTimeouts,
};
pub use state::{HealthState, LinkState, SuspendReason};
