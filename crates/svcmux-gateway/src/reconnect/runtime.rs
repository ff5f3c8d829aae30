//! Per-service runtime state shared by the hub and the supervisor

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use svcmux_core::{
    CircuitBreaker, DomainEvent, EndpointRegistry, EventSender, LinkState, Operation,
    OperationQueue, OperationResponse, PoolError, QueuedOperation, RetryPolicy, ServiceDescriptor,
    SubmitError, SuspendReason,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Trigger;
use crate::health::ServiceHealth;
use crate::pool::ConnectionPool;
use crate::snapshot::{BreakerSnapshot, QueueSnapshot, RetrySnapshot, ServiceSnapshot};

pub(crate) type Reply = oneshot::Sender<Result<OperationResponse, SubmitError>>;

/// Supervisor-owned link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,
    /// Connected but still replaying queued operations
    pub draining: bool,
    pub suspend_reason: Option<SuspendReason>,
}

impl LinkStatus {
    /// New operations may bypass the queue only when connected and drained
    fn accepts_direct(&self) -> bool {
        self.state == LinkState::Connected && !self.draining
    }
}

/// Result of a successful `submit`
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Executed right away
    Completed(OperationResponse),
    /// Deferred until the service recovers
    Queued(QueuedReceipt),
}

impl SubmitOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Handle to an operation waiting in the outage queue
#[derive(Debug)]
pub struct QueuedReceipt {
    operation_id: Uuid,
    position: usize,
    reply: oneshot::Receiver<Result<OperationResponse, SubmitError>>,
}

impl QueuedReceipt {
    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    /// 1-based queue position at enqueue time
    pub fn position(&self) -> usize {
        self.position
    }

    /// Wait for the replay outcome. Resolves to `ShuttingDown` if the hub
    /// stops first.
    pub async fn wait(self) -> Result<OperationResponse, SubmitError> {
        self.reply.await.unwrap_or(Err(SubmitError::ShuttingDown))
    }
}

enum Admission {
    Direct(Operation),
    Queued(QueuedReceipt),
}

pub struct ServiceRuntime {
    descriptor: Arc<ServiceDescriptor>,
    pool: ConnectionPool,
    health: Arc<ServiceHealth>,
    link: Mutex<LinkStatus>,
    queue: Mutex<OperationQueue<Reply>>,
    retry: Mutex<RetryPolicy>,
    breaker: Mutex<CircuitBreaker>,
    triggers: mpsc::UnboundedSender<Trigger>,
    events: EventSender,
    cancel: CancellationToken,
}

impl ServiceRuntime {
    pub fn new(
        descriptor: Arc<ServiceDescriptor>,
        pool: ConnectionPool,
        health: Arc<ServiceHealth>,
        triggers: mpsc::UnboundedSender<Trigger>,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue: Mutex::new(OperationQueue::new(descriptor.queue_capacity)),
            retry: Mutex::new(RetryPolicy::new(descriptor.retry)),
            breaker: Mutex::new(CircuitBreaker::new(descriptor.breaker)),
            link: Mutex::new(LinkStatus::default()),
            descriptor,
            pool,
            health,
            triggers,
            events,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.descriptor
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn health(&self) -> &Arc<ServiceHealth> {
        &self.health
    }

    pub fn link_status(&self) -> LinkStatus {
        *self.link.lock()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().depth()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Execute now if the link is up and nothing is queued; otherwise queue.
    pub async fn submit(&self, operation: Operation) -> Result<SubmitOutcome, SubmitError> {
        if self.cancel.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }
        let operation = match self.admit(operation)? {
            Admission::Queued(receipt) => return Ok(SubmitOutcome::Queued(receipt)),
            Admission::Direct(operation) => operation,
        };

        match self.pool.acquire().await {
            Ok(mut guard) => match guard.execute(&operation).await {
                Ok(response) => Ok(SubmitOutcome::Completed(response)),
                Err(err) => self.queue_after_failure(operation, SubmitError::Transport(err)),
            },
            // Suspended between the link check and the acquire
            Err(PoolError::Suspended(_)) => self.enqueue(operation).map(SubmitOutcome::Queued),
            Err(PoolError::Connect(err)) => {
                self.queue_after_failure(operation, SubmitError::Transport(err))
            }
            Err(e) => Err(SubmitError::Pool(e)),
        }
    }

    /// Ask the supervisor for an immediate reconnect
    pub fn request_reconnect(&self) {
        let _ = self.triggers.send(Trigger::ManualReconnect);
    }

    pub fn snapshot(&self, registry: &EndpointRegistry) -> ServiceSnapshot {
        let link = self.link_status();
        let (attempt, max_attempts, next_delay) = {
            let retry = self.retry.lock();
            (retry.attempt(), retry.max_attempts(), retry.current_delay())
        };
        let (breaker_state, failure_count) = {
            let breaker = self.breaker.lock();
            (breaker.state_at(Instant::now()), breaker.failure_count())
        };
        let (depth, capacity) = {
            let queue = self.queue.lock();
            (queue.depth(), queue.capacity())
        };

        ServiceSnapshot {
            service: self.descriptor.name.clone(),
            protocol: self.descriptor.protocol,
            endpoint: registry.endpoint(&self.descriptor.name).map(|e| e.address()),
            health: self.health.state(),
            consecutive_failures: self.health.consecutive_failures(),
            last_contact: self.health.last_contact(),
            link: link.state,
            draining: link.draining,
            suspend_reason: link.suspend_reason,
            retry: RetrySnapshot {
                attempt,
                max_attempts,
                next_delay_ms: next_delay.as_millis() as u64,
            },
            breaker: BreakerSnapshot {
                state: breaker_state,
                failure_count,
            },
            pool: self.pool.stats(),
            queue: QueueSnapshot { depth, capacity },
        }
    }

    /// Fail every queued operation (shutdown)
    pub fn fail_pending(&self) -> usize {
        let pending = self.queue.lock().drain_all();
        let count = pending.len();
        for item in pending {
            let _ = item.ticket.send(Err(SubmitError::ShuttingDown));
        }
        if count > 0 {
            debug!(service = %self.name(), count, "[Hub] Failed pending operations");
        }
        count
    }

    fn admit(&self, operation: Operation) -> Result<Admission, SubmitError> {
        let link = self.link.lock();
        let mut queue = self.queue.lock();
        if link.accepts_direct() && queue.depth() == 0 {
            return Ok(Admission::Direct(operation));
        }
        self.push(&mut queue, operation).map(Admission::Queued)
    }

    fn enqueue(&self, operation: Operation) -> Result<QueuedReceipt, SubmitError> {
        // Same lock order as admit and the drain
        let _link = self.link.lock();
        let mut queue = self.queue.lock();
        self.push(&mut queue, operation)
    }

    /// A direct execution failed. Keep the operation for replay if there is
    /// room, otherwise hand the failure back.
    fn queue_after_failure(
        &self,
        operation: Operation,
        failure: SubmitError,
    ) -> Result<SubmitOutcome, SubmitError> {
        match self.enqueue(operation) {
            Ok(receipt) => Ok(SubmitOutcome::Queued(receipt)),
            Err(SubmitError::Backpressure { .. }) => Err(failure),
            Err(e) => Err(e),
        }
    }

    /// Caller holds the queue lock. Shutdown cancels before it drains the
    /// queue under the same lock, so nothing lands after `fail_pending`.
    fn push(
        &self,
        queue: &mut OperationQueue<Reply>,
        operation: Operation,
    ) -> Result<QueuedReceipt, SubmitError> {
        if self.cancel.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }
        let service = self.name();
        let operation_id = operation.id;
        let (tx, rx) = oneshot::channel();
        match queue.push(QueuedOperation::new(operation, tx)) {
            Ok(()) => {
                let position = queue.depth();
                debug!(
                    service,
                    operation_id = %operation_id,
                    position,
                    "[Reconnect] Operation queued"
                );
                Ok(QueuedReceipt {
                    operation_id,
                    position,
                    reply: rx,
                })
            }
            Err(full) => {
                warn!(
                    service,
                    capacity = full.capacity,
                    "[Reconnect] Queue full, rejecting operation"
                );
                Err(SubmitError::Backpressure {
                    service: service.to_string(),
                    capacity: full.capacity,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Supervisor side
    // ------------------------------------------------------------------

    pub(crate) fn events(&self) -> &EventSender {
        &self.events
    }

    pub(crate) fn retry(&self) -> MutexGuard<'_, RetryPolicy> {
        self.retry.lock()
    }

    pub(crate) fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock()
    }

    /// Move the link to `new` and publish the change
    pub(crate) fn set_link(&self, new: LinkState, message: Option<String>) {
        let old = {
            let mut link = self.link.lock();
            let old = link.state;
            if old == new {
                return;
            }
            link.state = new;
            link.suspend_reason = None;
            link.draining = new == LinkState::Connected;
            old
        };
        info!(
            service = %self.name(),
            from = old.as_str(),
            to = new.as_str(),
            "[Reconnect] Link state changed"
        );
        self.events
            .emit(DomainEvent::link_changed(self.name(), old, new, message));
    }

    /// Enter Suspended and announce why
    pub(crate) fn suspend_link(&self, reason: SuspendReason) {
        let message = reason.message();
        let old = {
            let mut link = self.link.lock();
            let old = link.state;
            link.state = LinkState::Suspended;
            link.suspend_reason = Some(reason);
            link.draining = false;
            old
        };
        warn!(service = %self.name(), "[Reconnect] {}", message);
        if old != LinkState::Suspended {
            self.events.emit(DomainEvent::link_changed(
                self.name(),
                old,
                LinkState::Suspended,
                Some(message.clone()),
            ));
        }
        self.events.emit(DomainEvent::ServiceSuspended {
            service: self.name().to_string(),
            reason,
            message,
            at: chrono::Utc::now(),
        });
    }

    /// Next operation to replay, or `None` once drained (which also ends the
    /// draining phase, atomically with respect to `submit`)
    pub(crate) fn next_replay(&self) -> Option<QueuedOperation<Reply>> {
        let mut link = self.link.lock();
        let mut queue = self.queue.lock();
        let item = queue.begin_replay();
        if item.is_none() {
            link.draining = false;
        }
        item
    }

    pub(crate) fn finish_replay(&self) {
        self.queue.lock().finish_replay();
    }

    pub(crate) fn requeue_front(&self, item: QueuedOperation<Reply>) {
        self.queue.lock().requeue_front(item);
    }

    pub(crate) fn queued_len(&self) -> usize {
        self.queue.lock().len()
    }
}
