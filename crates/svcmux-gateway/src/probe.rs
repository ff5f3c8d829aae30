//! Endpoint probing
//!
//! Shared by the discovery engine (is anything listening on this port?) and
//! the health monitor (is the discovered endpoint still serving?). Probes use
//! their own disposable connections and never touch the pool.

use std::time::Duration;

use async_trait::async_trait;
use svcmux_core::{Endpoint, ProtocolKind, ServiceDescriptor, TransportError};
use tokio::net::TcpStream;

use crate::transport::{connect_error, http_error};

/// Classifies one endpoint as live or not
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `endpoint` as the protocol of `descriptor` dictates.
    ///
    /// Implementations should honour `descriptor.timeouts.probe()`; callers
    /// also bound the call externally.
    async fn probe(
        &self,
        descriptor: &ServiceDescriptor,
        endpoint: &Endpoint,
    ) -> Result<(), TransportError>;
}

/// Default prober.
///
/// - persistent socket: TCP handshake completes
/// - request-response: GET on the health path returns 2xx
pub struct TransportProber {
    client: reqwest::Client,
}

impl TransportProber {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn probe_socket(endpoint: &Endpoint, timeout: Duration) -> Result<(), TransportError> {
        let address = endpoint.address();
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|e| connect_error(&address, e))?;
        drop(stream);
        Ok(())
    }

    async fn probe_http(
        &self,
        endpoint: &Endpoint,
        health_path: &str,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let url = endpoint.url(health_path);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| http_error(&url, timeout, e))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                url,
            })
        }
    }
}

impl Default for TransportProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for TransportProber {
    async fn probe(
        &self,
        descriptor: &ServiceDescriptor,
        endpoint: &Endpoint,
    ) -> Result<(), TransportError> {
        let timeout = descriptor.timeouts.probe();
        match endpoint.protocol {
            ProtocolKind::PersistentSocket => Self::probe_socket(endpoint, timeout).await,
            ProtocolKind::RequestResponse => {
                self.probe_http(endpoint, &descriptor.health_path, timeout)
                    .await
            }
        }
    }
}

/// Run a probe with a hard upper bound, whatever the prober does
pub async fn bounded_probe(
    prober: &dyn Prober,
    descriptor: &ServiceDescriptor,
    endpoint: &Endpoint,
) -> Result<(), TransportError> {
    let timeout = descriptor.timeouts.probe();
    tokio::time::timeout(timeout, prober.probe(descriptor, endpoint))
        .await
        .unwrap_or(Err(TransportError::Timeout(timeout)))
}
