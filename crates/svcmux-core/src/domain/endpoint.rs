//! Resolved endpoints produced by discovery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProtocolKind, ServiceDescriptor};

/// A resolved (host, port, protocol) triple for one logical service.
///
/// Owned by the `EndpointRegistry`; replaced, never mutated, on rediscovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub service: String,
    pub host: String,
    pub port: u16,
    pub protocol: ProtocolKind,
    pub discovered_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn new(
        service: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        protocol: ProtocolKind,
    ) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
            port,
            protocol,
            discovered_at: Utc::now(),
        }
    }

    /// Endpoint for a descriptor's host at a specific port
    pub fn for_descriptor(descriptor: &ServiceDescriptor, port: u16) -> Self {
        Self::new(
            descriptor.name.clone(),
            descriptor.host.clone(),
            port,
            descriptor.protocol,
        )
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `http://host:port`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Absolute URL for a path on this endpoint
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url(), path)
        } else {
            format!("{}/{}", self.base_url(), path)
        }
    }
}
