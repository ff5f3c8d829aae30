//! Persistent message-socket transport
//!
//! Handshake is the TCP connect itself. Liveness is checked by peeking the
//! socket: a pending read of zero bytes means the peer closed it.

use std::time::Duration;

use async_trait::async_trait;
use svcmux_core::{Endpoint, Operation, OperationResponse, ProtocolKind, TransportError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::trace;

use super::{connect_error, Connection, Transport};

/// How long a liveness peek may wait for pending data
const PING_PEEK_WINDOW: Duration = Duration::from_millis(1);

pub struct SocketTransport {
    connect_timeout: Duration,
}

impl SocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let address = endpoint.address();
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| connect_error(&address, e))?;
        // Messages are small and latency-sensitive
        stream.set_nodelay(true).map_err(TransportError::io)?;

        trace!(address = %address, "[Transport] Socket connected");
        Ok(Box::new(SocketConnection { stream, address }))
    }

    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::PersistentSocket
    }
}

pub struct SocketConnection {
    stream: TcpStream,
    address: String,
}

#[async_trait]
impl Connection for SocketConnection {
    async fn ping(&mut self) -> Result<(), TransportError> {
        let mut buf = [0u8; 1];
        match tokio::time::timeout(PING_PEEK_WINDOW, self.stream.peek(&mut buf)).await {
            // Nothing pending: still open
            Err(_) => Ok(()),
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::io(e)),
        }
    }

    async fn execute(&mut self, operation: &Operation) -> Result<OperationResponse, TransportError> {
        self.stream
            .write_all(&operation.payload)
            .await
            .map_err(TransportError::io)?;
        self.stream.flush().await.map_err(TransportError::io)?;
        Ok(OperationResponse::accepted(operation.id))
    }

    fn description(&self) -> String {
        format!("socket://{}", self.address)
    }
}
