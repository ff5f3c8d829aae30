//! Layered configuration
//!
//! Sources are applied in increasing precedence:
//!
//! 1. Defaults (built in code by the host application)
//! 2. Persisted profile (JSON file written by the configuration UI)
//! 3. Explicit overrides (command line, tests, host code)
//!
//! A profile or override is a `ConfigLayer`: every field is optional and only
//! the fields present replace the lower layer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::{
    BreakerSettings, PoolLimits, ProtocolKind, RetrySettings, ServiceDescriptor, ServiceTimeouts,
};

/// Discovery engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Bound on a whole `discover()` call
    #[serde(default = "default_discovery_deadline_ms")]
    pub deadline_ms: u64,
    /// Periodic rediscovery; 0 disables it
    #[serde(default)]
    pub rediscover_interval_ms: u64,
}

const fn default_discovery_deadline_ms() -> u64 {
    5_000
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            deadline_ms: default_discovery_deadline_ms(),
            rediscover_interval_ms: 0,
        }
    }
}

impl DiscoverySettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn rediscover_interval(&self) -> Option<Duration> {
        (self.rediscover_interval_ms > 0).then(|| Duration::from_millis(self.rediscover_interval_ms))
    }
}

/// Health monitor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    /// Consecutive failures that make a service Unhealthy
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

const fn default_health_interval_ms() -> u64 {
    30_000
}

const fn default_unhealthy_threshold() -> u32 {
    3
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval_ms(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConnectivityConfig {
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub health: HealthSettings,
    /// Event bus capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    crate::event_bus::DEFAULT_CAPACITY
}

impl ConnectivityConfig {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            services,
            discovery: DiscoverySettings::default(),
            health: HealthSettings::default(),
            event_capacity: default_event_capacity(),
        }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Check invariants the runtime relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for svc in &self.services {
            if !seen.insert(svc.name.as_str()) {
                return Err(ConfigError::DuplicateService(svc.name.clone()));
            }
            let invalid = |reason: &str| ConfigError::Invalid {
                service: svc.name.clone(),
                reason: reason.to_string(),
            };
            if svc.name.trim().is_empty() {
                return Err(invalid("name must not be empty"));
            }
            if svc.pool.max == 0 {
                return Err(invalid("pool.max must be at least 1"));
            }
            if svc.pool.min > svc.pool.max {
                return Err(invalid("pool.min must not exceed pool.max"));
            }
            if svc.retry.multiplier < 1.0 {
                return Err(invalid("retry.multiplier must be >= 1.0"));
            }
            if !(0.0..=1.0).contains(&svc.retry.jitter_ratio) {
                return Err(invalid("retry.jitter_ratio must be within 0.0..=1.0"));
            }
            if svc.retry.initial_delay_ms > svc.retry.max_delay_ms {
                return Err(invalid("retry.initial_delay_ms must not exceed max_delay_ms"));
            }
            if svc.breaker.failure_threshold == 0 {
                return Err(invalid("breaker.failure_threshold must be at least 1"));
            }
            if svc.protocol == ProtocolKind::RequestResponse && !svc.health_path.starts_with('/') {
                return Err(invalid("health_path must start with '/'"));
            }
        }
        if self.health.unhealthy_threshold == 0 {
            return Err(ConfigError::Invalid {
                service: "*".to_string(),
                reason: "health.unhealthy_threshold must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Partial override for one service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceOverride {
    pub host: Option<String>,
    pub default_port: Option<u16>,
    pub candidate_ports: Option<Vec<u16>>,
    pub health_path: Option<String>,
    pub pool: Option<PoolLimits>,
    pub timeouts: Option<ServiceTimeouts>,
    pub retry: Option<RetrySettings>,
    pub breaker: Option<BreakerSettings>,
    pub queue_capacity: Option<usize>,
}

impl ServiceOverride {
    fn apply(&self, svc: &mut ServiceDescriptor) {
        if let Some(host) = &self.host {
            svc.host = host.clone();
        }
        if let Some(port) = self.default_port {
            svc.default_port = port;
        }
        if let Some(ports) = &self.candidate_ports {
            svc.candidate_ports = ports.clone();
        }
        if let Some(path) = &self.health_path {
            svc.health_path = path.clone();
        }
        if let Some(pool) = self.pool {
            svc.pool = pool;
        }
        if let Some(timeouts) = self.timeouts {
            svc.timeouts = timeouts;
        }
        if let Some(retry) = self.retry {
            svc.retry = retry;
        }
        if let Some(breaker) = self.breaker {
            svc.breaker = breaker;
        }
        if let Some(capacity) = self.queue_capacity {
            svc.queue_capacity = capacity;
        }
    }
}

/// One configuration source (profile file or explicit overrides)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigLayer {
    #[serde(default)]
    pub services: std::collections::HashMap<String, ServiceOverride>,
    pub discovery: Option<DiscoverySettings>,
    pub health: Option<HealthSettings>,
    pub event_capacity: Option<usize>,
}

impl ConfigLayer {
    pub fn service(mut self, name: impl Into<String>, overrides: ServiceOverride) -> Self {
        self.services.insert(name.into(), overrides);
        self
    }

    /// Load a layer from a JSON profile
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply(&self, config: &mut ConnectivityConfig) -> Result<(), ConfigError> {
        for (name, overrides) in &self.services {
            let svc = config
                .services
                .iter_mut()
                .find(|s| &s.name == name)
                .ok_or_else(|| ConfigError::UnknownService(name.clone()))?;
            overrides.apply(svc);
        }
        if let Some(discovery) = self.discovery {
            config.discovery = discovery;
        }
        if let Some(health) = self.health {
            config.health = health;
        }
        if let Some(capacity) = self.event_capacity {
            config.event_capacity = capacity;
        }
        Ok(())
    }
}

/// Default location of the persisted profile (`<config dir>/svcmux/profile.json`)
pub fn default_profile_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("svcmux").join("profile.json"))
}

/// Resolves defaults < profile < overrides into a validated config
pub struct ConfigLoader {
    defaults: ConnectivityConfig,
    profile: Option<ConfigLayer>,
    overrides: Vec<ConfigLayer>,
}

impl ConfigLoader {
    pub fn new(defaults: ConnectivityConfig) -> Self {
        Self {
            defaults,
            profile: None,
            overrides: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: ConfigLayer) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Load the profile from disk. A missing file is not an error.
    pub fn with_profile_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "[Config] No persisted profile");
            return Ok(self);
        }
        info!(path = %path.display(), "[Config] Loading persisted profile");
        self.profile = Some(ConfigLayer::from_file(path)?);
        Ok(self)
    }

    /// Add an explicit override layer; later layers win
    pub fn with_layer(mut self, layer: ConfigLayer) -> Self {
        self.overrides.push(layer);
        self
    }

    pub fn resolve(self) -> Result<ConnectivityConfig, ConfigError> {
        let mut config = self.defaults;
        if let Some(profile) = &self.profile {
            profile.apply(&mut config)?;
        }
        for layer in &self.overrides {
            layer.apply(&mut config)?;
        }
        config.validate()?;
        Ok(config)
    }
}
