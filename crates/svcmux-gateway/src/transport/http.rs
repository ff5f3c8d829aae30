//! HTTP request/response transport
//!
//! Connections are logical: `reqwest` keeps its own keep-alive pool
//! underneath, so a pooled `HttpConnection` only bounds concurrency and
//! carries the endpoint. Long-poll job submission is a request with a long
//! request timeout.

use std::time::Duration;

use async_trait::async_trait;
use svcmux_core::{Endpoint, Operation, OperationResponse, ProtocolKind, TransportError};
use tracing::trace;

use super::{http_error, Connection, Transport};

pub struct HttpTransport {
    client: reqwest::Client,
    health_path: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(health_path: String, connect_timeout: Duration, request_timeout: Duration) -> Self {
        // Builder only fails on TLS backend init; fall back to the default client
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            health_path,
            connect_timeout,
            request_timeout,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        trace!(base_url = %endpoint.base_url(), "[Transport] HTTP connection opened");
        Ok(Box::new(HttpConnection {
            client: self.client.clone(),
            endpoint: endpoint.clone(),
            health_path: self.health_path.clone(),
            ping_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }))
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::RequestResponse
    }
}

pub struct HttpConnection {
    client: reqwest::Client,
    endpoint: Endpoint,
    health_path: String,
    ping_timeout: Duration,
    request_timeout: Duration,
}

#[async_trait]
impl Connection for HttpConnection {
    async fn ping(&mut self) -> Result<(), TransportError> {
        let url = self.endpoint.url(&self.health_path);
        let response = self
            .client
            .get(&url)
            .timeout(self.ping_timeout)
            .send()
            .await
            .map_err(|e| http_error(&url, self.ping_timeout, e))?;
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

    /// POST the payload to the operation's route.
    ///
    /// 5xx responses are connectivity failures (the service is up but not
    /// serving); anything else is returned to the caller as-is.
    async fn execute(&mut self, operation: &Operation) -> Result<OperationResponse, TransportError> {
        let url = self.endpoint.url(operation.route_or_root());
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .body(operation.payload.clone())
            .send()
            .await
            .map_err(|e| http_error(&url, self.request_timeout, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| http_error(&url, self.request_timeout, e))?;

        Ok(OperationResponse {
            operation_id: operation.id,
            status: Some(status.as_u16()),
            body: body.to_vec(),
        })
    }

    fn description(&self) -> String {
        self.endpoint.base_url()
    }
}
