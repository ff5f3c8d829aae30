//! Per-service reconnection supervisor

use std::sync::Arc;
use std::time::Duration;

use svcmux_core::{
    Endpoint, EndpointRegistry, LinkState, PoolError, SubmitError, SuspendReason, TransportError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{ServiceRuntime, Trigger};
use crate::discovery::DiscoveryEngine;

/// Why a wait ended
enum Wake {
    Elapsed,
    Recovered,
    Manual,
    Cancelled,
}

enum Recovery {
    Connected,
    Exhausted,
    Cancelled,
}

enum Drain {
    Complete,
    Failed,
    Cancelled,
}

pub struct ServiceSupervisor {
    runtime: Arc<ServiceRuntime>,
    triggers: mpsc::UnboundedReceiver<Trigger>,
    discovery: Arc<DiscoveryEngine>,
    registry: Arc<EndpointRegistry>,
    cancel: CancellationToken,
}

impl ServiceSupervisor {
    pub fn new(
        runtime: Arc<ServiceRuntime>,
        triggers: mpsc::UnboundedReceiver<Trigger>,
        discovery: Arc<DiscoveryEngine>,
        registry: Arc<EndpointRegistry>,
    ) -> Self {
        let cancel = runtime.cancel_token().clone();
        Self {
            runtime,
            triggers,
            discovery,
            registry,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consume triggers until cancelled
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();
        debug!(service = %self.runtime.name(), "[Reconnect] Supervisor started");

        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                trigger = self.triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            let state = self.runtime.link_status().state;
            let skip_backoff = match (&trigger, state) {
                (Trigger::ManualReconnect, _) => {
                    self.reset_counters();
                    true
                }
                (Trigger::ConnectionFailed { error, .. }, LinkState::Connected) => {
                    debug!(service = %self.runtime.name(), error = %error, "[Reconnect] Pool reported failure");
                    self.runtime.breaker().record_failure(Instant::now());
                    false
                }
                (Trigger::Unhealthy, LinkState::Connected) => false,
                (other, state) => {
                    trace!(
                        service = %self.runtime.name(),
                        trigger = ?other,
                        state = state.as_str(),
                        "[Reconnect] Trigger ignored"
                    );
                    continue;
                }
            };

            match self.recover(skip_backoff).await {
                Recovery::Connected | Recovery::Exhausted => {}
                Recovery::Cancelled => break,
            }
        }

        debug!(service = %self.runtime.name(), "[Reconnect] Supervisor stopped");
    }

    /// Disconnected → (Suspended ⇄) Reconnecting → Connected | Suspended
    async fn recover(&mut self, mut skip_backoff: bool) -> Recovery {
        self.disconnect();

        loop {
            if self.cancel.is_cancelled() {
                return Recovery::Cancelled;
            }

            let gate = self.runtime.breaker().try_acquire(Instant::now());
            if let Err(retry_in) = gate {
                self.runtime
                    .suspend_link(SuspendReason::CircuitOpen { retry_in });
                match self.wait(retry_in, false).await {
                    Wake::Cancelled => return Recovery::Cancelled,
                    Wake::Manual => self.reset_counters(),
                    Wake::Elapsed | Wake::Recovered => {}
                }
                // The half-open trial goes right away
                skip_backoff = true;
                continue;
            }

            self.runtime.set_link(LinkState::Reconnecting, None);

            if !skip_backoff {
                let (attempt, delay) = {
                    let retry = self.runtime.retry();
                    (retry.attempt(), retry.next_delay())
                };
                info!(
                    service = %self.runtime.name(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "[Reconnect] Retrying after backoff"
                );
                match self.wait(delay, true).await {
                    Wake::Cancelled => return Recovery::Cancelled,
                    Wake::Manual => self.reset_counters(),
                    Wake::Recovered => {
                        debug!(service = %self.runtime.name(), "[Reconnect] Service is back, attempting now");
                    }
                    Wake::Elapsed => {}
                }
            }
            skip_backoff = false;

            match self.attempt().await {
                Ok(()) => {
                    self.on_connected();
                    match self.drain().await {
                        Drain::Complete => {
                            self.warm_up().await;
                            return Recovery::Connected;
                        }
                        Drain::Cancelled => return Recovery::Cancelled,
                        Drain::Failed => {
                            if self.cancel.is_cancelled() {
                                return Recovery::Cancelled;
                            }
                            self.runtime.breaker().record_failure(Instant::now());
                            self.disconnect();
                        }
                    }
                }
                Err(e) => {
                    self.runtime.breaker().record_failure(Instant::now());
                    let (attempt, exhausted) = {
                        let mut retry = self.runtime.retry();
                        retry.advance();
                        (retry.attempt(), retry.is_exhausted())
                    };
                    warn!(
                        service = %self.runtime.name(),
                        attempt,
                        error = %e,
                        "[Reconnect] Attempt failed"
                    );
                    if exhausted {
                        self.runtime.suspend_link(SuspendReason::RetriesExhausted);
                        return Recovery::Exhausted;
                    }
                }
            }
        }
    }

    fn disconnect(&self) {
        self.runtime.set_link(LinkState::Disconnected, None);
        self.runtime.pool().suspend();
        self.runtime.health().suspend();
    }

    /// Re-establish and validate one pool connection.
    ///
    /// Without an endpoint the service is rediscovered first. When the known
    /// endpoint refuses, the service may have restarted on another candidate
    /// port, so it is rediscovered and tried once more if it moved.
    async fn attempt(&self) -> Result<(), PoolError> {
        let descriptor = Arc::clone(self.runtime.descriptor());
        let Some(known) = self.registry.endpoint(&descriptor.name) else {
            debug!(service = %descriptor.name, "[Reconnect] No endpoint, rediscovering");
            if self.rediscover().await?.is_none() {
                return Err(PoolError::Connect(TransportError::NoEndpoint(
                    descriptor.name.clone(),
                )));
            }
            return self.establish().await;
        };

        match self.establish().await {
            Err(PoolError::Connect(err)) => match self.rediscover().await? {
                Some(moved) if moved.port != known.port || moved.host != known.host => {
                    info!(
                        service = %descriptor.name,
                        from = %known.address(),
                        to = %moved.address(),
                        "[Reconnect] Service moved, retrying on new endpoint"
                    );
                    self.establish().await
                }
                _ => Err(PoolError::Connect(err)),
            },
            other => other,
        }
    }

    async fn rediscover(&self) -> Result<Option<Endpoint>, PoolError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PoolError::ShuttingDown),
            found = self.discovery.rediscover(self.runtime.descriptor()) => Ok(found),
        }
    }

    async fn establish(&self) -> Result<(), PoolError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PoolError::ShuttingDown),
            result = self.runtime.pool().establish() => result,
        }
    }

    fn on_connected(&self) {
        self.runtime.retry().reset();
        self.runtime.breaker().record_success();
        self.runtime.pool().resume();
        // establish() validated a live connection: that is a successful probe
        self.runtime.health().record_probe(&Ok(()));
        self.runtime.set_link(LinkState::Connected, None);
        info!(service = %self.runtime.name(), "[Reconnect] Reconnected");
    }

    /// Replay queued operations FIFO through the pool
    async fn drain(&mut self) -> Drain {
        let mut replayed = 0usize;
        let outcome = loop {
            if self.cancel.is_cancelled() {
                break Drain::Cancelled;
            }
            let Some(item) = self.runtime.next_replay() else {
                break Drain::Complete;
            };

            let result = match self.runtime.pool().acquire().await {
                Ok(mut guard) => guard
                    .execute(&item.operation)
                    .await
                    .map_err(SubmitError::Transport),
                Err(e) => Err(SubmitError::Pool(e)),
            };

            match result {
                Ok(response) => {
                    self.runtime.finish_replay();
                    // Submitter may have dropped its receipt
                    let _ = item.ticket.send(Ok(response));
                    replayed += 1;
                }
                Err(e) => {
                    warn!(
                        service = %self.runtime.name(),
                        operation_id = %item.operation.id,
                        error = %e,
                        "[Reconnect] Replay failed, re-queuing remaining operations"
                    );
                    self.runtime.requeue_front(item);
                    break Drain::Failed;
                }
            }
        };

        let requeued = match outcome {
            Drain::Failed => self.runtime.queued_len(),
            _ => 0,
        };
        if replayed > 0 || requeued > 0 {
            info!(
                service = %self.runtime.name(),
                replayed,
                requeued,
                "[Reconnect] Replayed queued operations"
            );
            self.runtime
                .events()
                .emit(svcmux_core::DomainEvent::OperationsReplayed {
                    service: self.runtime.name().to_string(),
                    replayed,
                    requeued,
                    at: chrono::Utc::now(),
                });
        }
        outcome
    }

    async fn warm_up(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.runtime.pool().warm_up() => {}
        }
    }

    fn reset_counters(&self) {
        info!(service = %self.runtime.name(), "[Reconnect] Manual reconnect, counters reset");
        self.runtime.retry().reset();
        self.runtime.breaker().reset();
    }

    /// Sleep for `delay` while still consuming triggers
    async fn wait(&mut self, delay: Duration, wake_on_recovery: bool) -> Wake {
        let cancel = self.cancel.clone();
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Wake::Cancelled,
                trigger = self.triggers.recv() => match trigger {
                    None => return Wake::Cancelled,
                    Some(Trigger::ManualReconnect) => return Wake::Manual,
                    Some(Trigger::Recovered) if wake_on_recovery => return Wake::Recovered,
                    Some(other) => {
                        trace!(service = %self.runtime.name(), trigger = ?other, "[Reconnect] Trigger absorbed");
                    }
                },
                _ = &mut sleep => return Wake::Elapsed,
            }
        }
    }
}
