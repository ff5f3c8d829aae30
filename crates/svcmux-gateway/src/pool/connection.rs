//! Pooled connections and the RAII guard lent to borrowers

use std::fmt;
use std::sync::Arc;

use svcmux_core::{Operation, OperationResponse, TransportError};
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use uuid::Uuid;

use super::PoolInner;
use crate::transport::Connection;

/// One live transport handle owned by a pool
pub struct PooledConnection {
    id: Uuid,
    conn: Box<dyn Connection>,
    created_at: Instant,
    last_used: Instant,
    in_use: bool,
    /// Outcome of the most recent ping, if any
    last_validation: Option<bool>,
}

impl PooledConnection {
    pub(super) fn new(id: Uuid, conn: Box<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            conn,
            created_at: now,
            last_used: now,
            in_use: false,
            last_validation: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub fn last_validation(&self) -> Option<bool> {
        self.last_validation
    }

    pub(super) fn mark_in_use(&mut self) {
        self.in_use = true;
    }

    pub(super) fn mark_idle(&mut self, now: Instant) {
        self.in_use = false;
        self.last_used = now;
    }

    pub(super) async fn validate(&mut self) -> Result<(), TransportError> {
        let result = self.conn.ping().await;
        self.last_validation = Some(result.is_ok());
        result
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("conn", &self.conn.description())
            .field("in_use", &self.in_use)
            .field("last_validation", &self.last_validation)
            .finish()
    }
}

/// Exclusive loan of one pooled connection.
///
/// Returned to the pool on `release()` or drop. A guard that saw a transport
/// failure is destroyed instead of returned.
pub struct PooledGuard {
    conn: Option<PooledConnection>,
    pool: Arc<PoolInner>,
    failed: bool,
    // Dropped after the connection is back in the idle set
    _permit: OwnedSemaphorePermit,
}

impl PooledGuard {
    pub(super) fn new(
        mut conn: PooledConnection,
        pool: Arc<PoolInner>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        conn.mark_in_use();
        Self {
            conn: Some(conn),
            pool,
            failed: false,
            _permit: permit,
        }
    }

    pub fn id(&self) -> Uuid {
        self.conn.as_ref().map(|c| c.id).unwrap_or_else(Uuid::nil)
    }

    pub fn service(&self) -> &str {
        self.pool.service()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Raw access to the transport handle
    pub fn connection(&mut self) -> Option<&mut (dyn Connection + 'static)> {
        self.conn.as_mut().map(|c| c.conn.as_mut())
    }

    /// Execute an operation, bounded by the service's request timeout.
    ///
    /// A transport failure is reported to the pool automatically.
    pub async fn execute(&mut self, operation: &Operation) -> Result<OperationResponse, TransportError> {
        let timeout = self.pool.request_timeout();
        let Some(pooled) = self.conn.as_mut() else {
            return Err(TransportError::Closed);
        };
        let result = match tokio::time::timeout(timeout, pooled.conn.execute(operation)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };
        if let Err(err) = &result {
            self.report_failure(err);
        }
        result
    }

    /// Mark this connection broken; the pool destroys it on release and
    /// signals the failure. Repeated reports are ignored.
    pub fn report_failure(&mut self, err: &TransportError) {
        if self.failed {
            return;
        }
        self.failed = true;
        let id = self.id();
        self.pool.connection_failed(id, err);
    }

    /// Return the connection to the pool
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PooledGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn, self.failed);
        }
    }
}

impl fmt::Debug for PooledGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledGuard")
            .field("service", &self.pool.service())
            .field("conn", &self.conn)
            .field("failed", &self.failed)
            .finish()
    }
}
