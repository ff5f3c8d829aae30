//! Connection Pool
//!
//! One pool per service. Lends connections to one borrower at a time, creates
//! them lazily up to `max`, validates them before reuse, and reaps idle ones.
//!
//! ```text
//!   acquire() ──▶ semaphore permit (≤ max lent) ──▶ idle? ──ping──▶ lend
//!                        │ deadline                  │ none
//!                        ▼                           ▼
//!                 AcquireTimeout                connect new ──▶ lend
//!
//!   guard drop ──▶ failed / suspended / shutting down? ──▶ destroy
//!                                                  else ──▶ idle (LIFO)
//! ```
//!
//! The idle set and counters sit behind one mutex, never held across an
//! `.await`. The supervisor's `suspend`/`resume`/`establish` go through the
//! same mutex, so pool membership changes are serialised per service.

mod connection;
mod stats;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use svcmux_core::{
    DomainEvent, EndpointRegistry, EventSender, PoolError, ServiceDescriptor, TransportError,
};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

pub use connection::{PooledConnection, PooledGuard};
pub use stats::{PoolStats, WaitHistogram};

use crate::reconnect::Trigger;
use crate::transport::Transport;

/// Reaper never sweeps more often than this
const MIN_REAP_INTERVAL: Duration = Duration::from_millis(100);
/// Nor less often than this
const MAX_REAP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct PoolState {
    /// Least recently used at the front
    idle: VecDeque<PooledConnection>,
    in_use: usize,
    suspended: bool,
    shutting_down: bool,
    stats: PoolStats,
}

impl PoolState {
    fn total(&self) -> usize {
        self.idle.len() + self.in_use
    }

    fn destroy(&mut self, conn: PooledConnection) {
        self.stats.destroyed += 1;
        trace!(connection_id = %conn.id(), "[Pool] Connection destroyed");
        drop(conn);
    }

    fn destroy_idle(&mut self) -> usize {
        let count = self.idle.len();
        self.stats.destroyed += count as u64;
        self.idle.clear();
        count
    }
}

pub(crate) struct PoolInner {
    descriptor: Arc<ServiceDescriptor>,
    registry: Arc<EndpointRegistry>,
    transport: Arc<dyn Transport>,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    events: EventSender,
    failures: Option<mpsc::UnboundedSender<Trigger>>,
}

impl PoolInner {
    pub(crate) fn service(&self) -> &str {
        &self.descriptor.name
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.descriptor.timeouts.request()
    }

    /// Open a new connection to the current endpoint
    async fn connect_new(&self) -> Result<PooledConnection, TransportError> {
        let endpoint = self
            .registry
            .endpoint(self.service())
            .ok_or_else(|| TransportError::NoEndpoint(self.service().to_string()))?;
        let id = Uuid::new_v4();

        let conn = self.transport.connect(&endpoint).await?;
        self.state.lock().stats.created += 1;
        debug!(
            service = %self.service(),
            connection_id = %id,
            target = %conn.description(),
            "[Pool] Connection created"
        );
        Ok(PooledConnection::new(id, conn))
    }

    /// Return a lent connection
    pub(crate) fn give_back(&self, mut conn: PooledConnection, failed: bool) {
        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(1);
        state.stats.released += 1;

        if failed || state.suspended || state.shutting_down {
            state.destroy(conn);
            return;
        }
        if state.idle.len() + state.in_use >= self.descriptor.pool.max {
            // establish() may have parked one while this was lent
            state.destroy(conn);
            return;
        }
        conn.mark_idle(Instant::now());
        state.idle.push_back(conn);
    }

    /// A borrower saw a transport error
    pub(crate) fn connection_failed(&self, connection_id: Uuid, err: &TransportError) {
        self.state.lock().stats.failures += 1;
        self.signal_failure(connection_id, err);
    }

    fn signal_failure(&self, connection_id: Uuid, err: &TransportError) {
        warn!(
            service = %self.service(),
            connection_id = %connection_id,
            error = %err,
            "[Pool] Connection failed"
        );
        self.events.emit(DomainEvent::ConnectionFailed {
            service: self.service().to_string(),
            connection_id,
            error: err.to_string(),
            at: chrono::Utc::now(),
        });
        if let Some(tx) = &self.failures {
            // Receiver gone means the supervisor already stopped
            let _ = tx.send(Trigger::ConnectionFailed {
                connection_id,
                error: err.to_string(),
            });
        }
    }

    fn check_open(&self) -> Result<(), PoolError> {
        let state = self.state.lock();
        if state.shutting_down {
            Err(PoolError::ShuttingDown)
        } else if state.suspended {
            Err(PoolError::Suspended(self.service().to_string()))
        } else {
            Ok(())
        }
    }
}

/// An `in_use` slot taken before the connection is lent.
///
/// Given back on drop, so a cancelled `acquire()` does not leak the count.
/// `commit` hands the slot over to the `PooledGuard`.
struct Reservation<'a> {
    inner: &'a PoolInner,
    armed: bool,
}

impl<'a> Reservation<'a> {
    fn hold(inner: &'a PoolInner, state: &mut PoolState) -> Self {
        state.in_use += 1;
        Self { inner, armed: true }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
        }
    }
}

/// Per-service connection pool (cheap to clone)
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// `failures` receives a `Trigger::ConnectionFailed` for every transport
    /// failure reported by a borrower.
    pub fn new(
        descriptor: Arc<ServiceDescriptor>,
        registry: Arc<EndpointRegistry>,
        transport: Arc<dyn Transport>,
        events: EventSender,
        failures: Option<mpsc::UnboundedSender<Trigger>>,
    ) -> Self {
        let max = descriptor.pool.max.max(1);
        Self {
            inner: Arc::new(PoolInner {
                descriptor,
                registry,
                transport,
                semaphore: Arc::new(Semaphore::new(max)),
                state: Mutex::new(PoolState::default()),
                events,
                failures,
            }),
        }
    }

    pub fn service(&self) -> &str {
        self.inner.service()
    }

    /// Borrow a connection, waiting up to the acquire timeout when all `max`
    /// connections are lent out.
    pub async fn acquire(&self) -> Result<PooledGuard, PoolError> {
        self.inner.check_open()?;

        let deadline = self.inner.descriptor.timeouts.acquire();
        let started = Instant::now();
        let permit = match tokio::time::timeout(
            deadline,
            Arc::clone(&self.inner.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            // Semaphore closed by shutdown()
            Ok(Err(_)) => return Err(PoolError::ShuttingDown),
            Err(_) => {
                self.inner.state.lock().stats.timeouts += 1;
                warn!(
                    service = %self.service(),
                    timeout_ms = deadline.as_millis() as u64,
                    "[Pool] Acquire timed out"
                );
                return Err(PoolError::AcquireTimeout(deadline));
            }
        };
        let waited = started.elapsed();
        // May have been suspended while waiting
        self.inner.check_open()?;

        let validate = self.inner.descriptor.protocol.validates_on_reuse();
        loop {
            let candidate = {
                let mut state = self.inner.state.lock();
                // Counted as lent while it is being validated
                state
                    .idle
                    .pop_back()
                    .map(|conn| (conn, Reservation::hold(&self.inner, &mut state)))
            };
            let Some((mut conn, reservation)) = candidate else { break };

            if validate {
                if let Err(e) = conn.validate().await {
                    debug!(
                        service = %self.service(),
                        connection_id = %conn.id(),
                        error = %e,
                        "[Pool] Idle connection failed validation"
                    );
                    drop(reservation);
                    self.inner.state.lock().destroy(conn);
                    continue;
                }
            }

            let mut state = self.inner.state.lock();
            state.stats.reused += 1;
            state.stats.acquired += 1;
            state.stats.wait_histogram.record(waited);
            drop(state);
            reservation.commit();
            trace!(service = %self.service(), connection_id = %conn.id(), "[Pool] Reused connection");
            return Ok(PooledGuard::new(conn, Arc::clone(&self.inner), permit));
        }

        let reservation = {
            let mut state = self.inner.state.lock();
            Reservation::hold(&self.inner, &mut state)
        };
        let conn = match self.inner.connect_new().await {
            Ok(conn) => conn,
            Err(e) => {
                drop(reservation);
                self.inner.state.lock().stats.failures += 1;
                self.inner.signal_failure(Uuid::nil(), &e);
                return Err(PoolError::Connect(e));
            }
        };

        let mut state = self.inner.state.lock();
        state.stats.acquired += 1;
        state.stats.wait_histogram.record(waited);
        drop(state);
        reservation.commit();
        Ok(PooledGuard::new(conn, Arc::clone(&self.inner), permit))
    }

    /// Create and validate one connection, bypassing suspension.
    ///
    /// Used by reconnect attempts. On success the connection is parked in the
    /// idle set for the next borrower.
    pub async fn establish(&self) -> Result<(), PoolError> {
        if self.inner.state.lock().shutting_down {
            return Err(PoolError::ShuttingDown);
        }
        let mut conn = self.inner.connect_new().await?;
        if let Err(e) = conn.validate().await {
            self.inner.state.lock().destroy(conn);
            return Err(PoolError::ConnectionInvalid(e.to_string()));
        }

        let mut state = self.inner.state.lock();
        if state.shutting_down || state.total() >= self.inner.descriptor.pool.max {
            state.destroy(conn);
        } else {
            conn.mark_idle(Instant::now());
            state.idle.push_back(conn);
        }
        Ok(())
    }

    /// Pre-create connections up to `min`. Stops at the first failure.
    pub async fn warm_up(&self) -> usize {
        let min = self.inner.descriptor.pool.min;
        let mut created = 0;
        loop {
            {
                let state = self.inner.state.lock();
                if state.suspended || state.shutting_down || state.total() >= min {
                    break;
                }
            }
            match self.inner.connect_new().await {
                Ok(mut conn) => {
                    let mut state = self.inner.state.lock();
                    if state.total() >= self.inner.descriptor.pool.max {
                        state.destroy(conn);
                        break;
                    }
                    conn.mark_idle(Instant::now());
                    state.idle.push_back(conn);
                    created += 1;
                }
                Err(e) => {
                    debug!(service = %self.service(), error = %e, "[Pool] Warm-up stopped");
                    break;
                }
            }
        }
        if created > 0 {
            debug!(service = %self.service(), created, "[Pool] Warmed up");
        }
        created
    }

    /// Destroy idle connections and refuse new acquisitions
    pub fn suspend(&self) {
        let mut state = self.inner.state.lock();
        if state.suspended {
            return;
        }
        state.suspended = true;
        let destroyed = state.destroy_idle();
        info!(service = %self.service(), destroyed, "[Pool] Suspended");
    }

    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        if state.suspended {
            state.suspended = false;
            info!(service = %self.service(), "[Pool] Resumed");
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.state.lock().suspended
    }

    /// Fail waiters fast and drop idle connections. Lent connections are
    /// destroyed when returned.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;
        let destroyed = state.destroy_idle();
        drop(state);
        self.inner.semaphore.close();
        debug!(service = %self.service(), destroyed, "[Pool] Shut down");
    }

    /// Destroy idle connections unused for longer than the idle timeout,
    /// keeping at least `min` connections alive.
    pub fn reap_idle(&self, now: Instant) -> usize {
        let idle_timeout = self.inner.descriptor.timeouts.idle();
        let min = self.inner.descriptor.pool.min;
        let mut state = self.inner.state.lock();
        let mut reaped = 0;
        while state.total() > min {
            let expired = state
                .idle
                .front()
                .is_some_and(|c| now.saturating_duration_since(c.last_used()) >= idle_timeout);
            if !expired {
                break;
            }
            if let Some(conn) = state.idle.pop_front() {
                state.destroy(conn);
                reaped += 1;
            }
        }
        if reaped > 0 {
            debug!(service = %self.service(), reaped, "[Pool] Reaped idle connections");
        }
        reaped
    }

    /// Background idle sweep until `cancel` fires
    pub fn spawn_reaper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = self.clone();
        let every = (self.inner.descriptor.timeouts.idle() / 2)
            .clamp(MIN_REAP_INTERVAL, MAX_REAP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        pool.reap_idle(Instant::now());
                    }
                }
            }
            trace!(service = %pool.service(), "[Pool] Reaper stopped");
        })
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            in_use: state.in_use,
            idle: state.idle.len(),
            suspended: state.suspended,
            ..state.stats.clone()
        }
    }
}
