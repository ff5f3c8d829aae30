//! Transport abstraction for service connections
//!
//! A `Transport` opens `Connection`s to a resolved endpoint. New protocol
//! families are added as new implementations; the pool, supervisor and
//! discovery only see the traits.

mod http;
mod tcp;

use std::sync::Arc;

use async_trait::async_trait;
use svcmux_core::{
    Endpoint, Operation, OperationResponse, ProtocolKind, ServiceDescriptor, TransportError,
};

pub use http::{HttpConnection, HttpTransport};
pub use tcp::{SocketConnection, SocketTransport};

/// One live transport handle.
///
/// Methods take `&mut self`: a connection is used by exactly one borrower at a
/// time.
#[async_trait]
pub trait Connection: Send {
    /// Cheap liveness check used before reuse and after `establish`
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Execute an opaque operation
    async fn execute(&mut self, operation: &Operation) -> Result<OperationResponse, TransportError>;

    /// Human readable description for logging
    fn description(&self) -> String;
}

/// Opens connections for one protocol family
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError>;

    fn protocol(&self) -> ProtocolKind;
}

/// Factory for creating transport instances
pub struct TransportFactory;

impl TransportFactory {
    /// Default transport for a descriptor's protocol kind
    pub fn create(descriptor: &ServiceDescriptor) -> Arc<dyn Transport> {
        match descriptor.protocol {
            ProtocolKind::PersistentSocket => {
                Arc::new(SocketTransport::new(descriptor.timeouts.connect()))
            }
            ProtocolKind::RequestResponse => Arc::new(HttpTransport::new(
                descriptor.health_path.clone(),
                descriptor.timeouts.connect(),
                descriptor.timeouts.request(),
            )),
        }
    }
}

/// Map an I/O error from a connect attempt
pub(crate) fn connect_error(address: &str, err: std::io::Error) -> TransportError {
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => TransportError::Refused(address.to_string()),
        _ => TransportError::io(err),
    }
}

/// Map a reqwest error
pub(crate) fn http_error(url: &str, timeout: std::time::Duration, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Refused(url.to_string())
    } else {
        TransportError::Http(err.to_string())
    }
}
