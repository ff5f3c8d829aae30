//! ServiceHub - dependency-injected owner of all per-service state
//!
//! There are no process-wide singletons: the host builds one hub from a
//! resolved configuration, starts it, and talks to it by service name.
//!
//! ```text
//!                       ┌───────────── ServiceHub ─────────────┐
//!   submit/acquire ───▶ │ runtimes: DashMap<name, ServiceRuntime>│
//!   snapshot        ◀── │   pool · health · queue · retry · cb   │
//!   force_reconnect ──▶ │ DiscoveryEngine ─▶ EndpointRegistry    │
//!   subscribe       ◀── │ HealthMonitor   ─▶ supervisors (mpsc)  │
//!                       └─────────────── EventBus ───────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use svcmux_core::{
    ConfigError, ConnectivityConfig, DomainEvent, EndpointRegistry, EventBus, EventReceiver,
    Operation, SubmitError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{DiscoveryEngine, DiscoveryReport};
use crate::health::{HealthMonitor, ServiceHealth};
use crate::pool::{ConnectionPool, PooledGuard};
use crate::probe::{Prober, TransportProber};
use crate::reconnect::{ServiceRuntime, ServiceSupervisor, SubmitOutcome};
use crate::snapshot::{ProbeReport, ServiceSnapshot};
use crate::transport::{Transport, TransportFactory};

/// Builder for [`ServiceHub`]
pub struct HubBuilder {
    config: ConnectivityConfig,
    prober: Option<Arc<dyn Prober>>,
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl HubBuilder {
    pub fn new(config: ConnectivityConfig) -> Self {
        Self {
            config,
            prober: None,
            transports: HashMap::new(),
        }
    }

    /// Replace the default `TransportProber`
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Replace the protocol-default transport of one service
    pub fn with_transport(mut self, service: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(service.into(), transport);
        self
    }

    pub fn build(mut self) -> Result<ServiceHub, ConfigError> {
        self.config.validate()?;
        if let Some(unknown) = self
            .transports
            .keys()
            .find(|name| self.config.service(name).is_none())
        {
            return Err(ConfigError::UnknownService(unknown.clone()));
        }

        let registry = Arc::new(EndpointRegistry::new(self.config.services.clone()));
        let bus = EventBus::with_capacity(self.config.event_capacity);
        let cancel = CancellationToken::new();
        let prober = self
            .prober
            .take()
            .unwrap_or_else(|| Arc::new(TransportProber::new()));

        let discovery = Arc::new(
            DiscoveryEngine::new(
                Arc::clone(&prober),
                Arc::clone(&registry),
                bus.sender(),
                self.config.discovery.deadline(),
            )
            .with_cancellation(cancel.child_token()),
        );
        let monitor = Arc::new(HealthMonitor::new(
            self.config.health.interval(),
            prober,
            Arc::clone(&registry),
        ));

        let runtimes = DashMap::new();
        let mut supervisors = Vec::with_capacity(registry.service_names().len());
        for descriptor in registry.descriptors() {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = self
                .transports
                .remove(&descriptor.name)
                .unwrap_or_else(|| TransportFactory::create(&descriptor));

            let pool = ConnectionPool::new(
                Arc::clone(&descriptor),
                Arc::clone(&registry),
                transport,
                bus.sender(),
                Some(tx.clone()),
            );
            let health = Arc::new(ServiceHealth::new(
                descriptor.name.clone(),
                self.config.health.unhealthy_threshold,
                bus.sender(),
                Some(tx.clone()),
            ));
            let runtime = Arc::new(ServiceRuntime::new(
                Arc::clone(&descriptor),
                pool,
                health,
                tx,
                bus.sender(),
                cancel.child_token(),
            ));

            supervisors.push(ServiceSupervisor::new(
                Arc::clone(&runtime),
                rx,
                Arc::clone(&discovery),
                Arc::clone(&registry),
            ));
            runtimes.insert(descriptor.name.clone(), runtime);
        }

        debug!(services = runtimes.len(), "[Hub] Built");
        Ok(ServiceHub {
            config: self.config,
            registry,
            bus,
            discovery,
            monitor,
            runtimes,
            supervisors: Mutex::new(supervisors),
            tasks: Mutex::new(Vec::new()),
            cancel,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }
}

pub struct ServiceHub {
    config: ConnectivityConfig,
    registry: Arc<EndpointRegistry>,
    bus: EventBus,
    discovery: Arc<DiscoveryEngine>,
    monitor: Arc<HealthMonitor>,
    runtimes: DashMap<String, Arc<ServiceRuntime>>,
    /// Built but not yet spawned
    supervisors: Mutex<Vec<ServiceSupervisor>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl ServiceHub {
    pub fn builder(config: ConnectivityConfig) -> HubBuilder {
        HubBuilder::new(config)
    }

    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// Runtime state of one service
    pub fn runtime(&self, service: &str) -> Option<Arc<ServiceRuntime>> {
        self.runtimes.get(service).map(|r| Arc::clone(r.value()))
    }

    /// Run initial discovery, then spawn every background task: one
    /// supervisor, health monitor and idle reaper per service, plus periodic
    /// rediscovery when configured. Calling it again only rediscovers.
    pub async fn start(&self) -> DiscoveryReport {
        let report = self.discover().await;
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("[Hub] Already started");
            return report;
        }

        let supervisors = std::mem::take(&mut *self.supervisors.lock());
        let mut tasks = Vec::new();
        for supervisor in supervisors {
            tasks.push(supervisor.spawn());
        }

        for name in self.registry.service_names() {
            let Some(runtime) = self.runtime(name) else {
                continue;
            };
            let cancel = runtime.cancel_token().clone();
            tasks.push(self.monitor.spawn(
                Arc::clone(runtime.descriptor()),
                Arc::clone(runtime.health()),
                cancel.clone(),
            ));
            tasks.push(runtime.pool().spawn_reaper(cancel.clone()));

            if runtime.descriptor().pool.min > 0 && report.endpoint(name).is_some() {
                let pool = runtime.pool().clone();
                tasks.push(tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = pool.warm_up() => {}
                    }
                }));
            }
        }

        if let Some(interval) = self.config.discovery.rediscover_interval() {
            tasks.push(Arc::clone(&self.discovery).spawn_periodic(interval));
        }

        let services = self.runtimes.len();
        self.tasks.lock().extend(tasks);
        info!(
            services,
            found = report.found().len(),
            "[Hub] Started"
        );
        self.bus.sender().emit(DomainEvent::HubStarted {
            services,
            at: chrono::Utc::now(),
        });
        report
    }

    /// Run one discovery pass over every service
    pub async fn discover(&self) -> DiscoveryReport {
        self.discovery.discover_all().await
    }

    /// Submit an operation: executed now, queued for replay, or rejected
    pub async fn submit(&self, service: &str, operation: Operation) -> Result<SubmitOutcome, SubmitError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }
        let runtime = self.lookup(service)?;
        runtime.submit(operation).await
    }

    /// Borrow a pooled connection directly
    pub async fn acquire(&self, service: &str) -> Result<PooledGuard, SubmitError> {
        let runtime = self.lookup(service)?;
        Ok(runtime.pool().acquire().await?)
    }

    /// Snapshots of every service, in declaration order
    pub fn snapshot(&self) -> Vec<ServiceSnapshot> {
        self.registry
            .service_names()
            .iter()
            .filter_map(|name| self.service_snapshot(name))
            .collect()
    }

    pub fn service_snapshot(&self, service: &str) -> Option<ServiceSnapshot> {
        self.runtime(service)
            .map(|runtime| runtime.snapshot(&self.registry))
    }

    /// Retry now, regardless of breaker and retry policy
    pub fn force_reconnect(&self, service: &str) -> Result<(), SubmitError> {
        let runtime = self.lookup(service)?;
        info!(service, "[Hub] Force reconnect requested");
        runtime.request_reconnect();
        Ok(())
    }

    /// Probe a service once, out of schedule ("test connection")
    pub async fn test_connection(&self, service: &str) -> Result<ProbeReport, SubmitError> {
        let runtime = self.lookup(service)?;
        let started = Instant::now();
        let result = self
            .monitor
            .probe_now(runtime.descriptor(), runtime.health())
            .await;
        Ok(ProbeReport {
            service: service.to_string(),
            ok: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            health: runtime.health().state(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Subscribe to all events emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    /// Stop every task, fail waiters and queued operations. Idempotent.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("[Hub] Shutting down");
        self.cancel.cancel();
        for entry in self.runtimes.iter() {
            entry.value().pool().shutdown();
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "[Hub] Background task panicked");
                }
            }
        }
        self.supervisors.lock().clear();

        let mut failed = 0;
        for entry in self.runtimes.iter() {
            failed += entry.value().fail_pending();
        }
        info!(failed_pending = failed, "[Hub] Stopped");
        self.bus.sender().emit(DomainEvent::HubStopped {
            at: chrono::Utc::now(),
        });
    }

    fn lookup(&self, service: &str) -> Result<Arc<ServiceRuntime>, SubmitError> {
        self.runtime(service)
            .ok_or_else(|| SubmitError::UnknownService(service.to_string()))
    }
}

impl Drop for ServiceHub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
