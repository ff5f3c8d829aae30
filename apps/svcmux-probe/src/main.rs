//! svcmux-probe: discover the configured local services, test each one once,
//! and print the resulting status snapshot as JSON.
//!
//! Environment:
//! - `SVCMUX_PROFILE`: path of the persisted profile (defaults to the user
//!   config dir)
//! - `SVCMUX_LOG_DIR`: also write rotated log files there
//! - `RUST_LOG`: log filter

use std::path::PathBuf;

use anyhow::{Context, Result};
use svcmux_core::{
    default_profile_path, ConfigLoader, ConnectivityConfig, ProtocolKind, ServiceDescriptor,
};
use svcmux_gateway::{init_tracing, LoggingConfig, ServiceHub};
use tracing::{info, warn};

/// Built-in service table; the profile overrides ports and limits
fn default_services() -> Vec<ServiceDescriptor> {
    vec![
        ServiceDescriptor::new("comfyui", ProtocolKind::PersistentSocket, 8188)
            .with_candidate_ports([8189, 8190]),
        ServiceDescriptor::new("a1111", ProtocolKind::RequestResponse, 7860)
            .with_candidate_ports([7861, 7862])
            .with_health_path("/internal/ping"),
        ServiceDescriptor::new("llm", ProtocolKind::RequestResponse, 4000)
            .with_health_path("/health"),
    ]
}

fn profile_path() -> Option<PathBuf> {
    std::env::var_os("SVCMUX_PROFILE")
        .map(PathBuf::from)
        .or_else(default_profile_path)
}

fn load_config() -> Result<ConnectivityConfig> {
    let mut loader = ConfigLoader::new(ConnectivityConfig::new(default_services()));
    if let Some(path) = profile_path() {
        loader = loader
            .with_profile_file(&path)
            .with_context(|| format!("loading profile {}", path.display()))?;
    }
    loader.resolve().context("resolving configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let mut logging = LoggingConfig::default();
    if let Some(dir) = std::env::var_os("SVCMUX_LOG_DIR") {
        logging = logging.with_log_dir(dir);
    }
    let _log_guard = init_tracing(&logging)?;

    let config = load_config()?;
    info!(services = config.services.len(), "[Probe] Configuration resolved");

    let hub = ServiceHub::builder(config).build()?;
    let report = hub.start().await;
    if report.deadline_exceeded {
        warn!(elapsed_ms = report.elapsed.as_millis() as u64, "[Probe] Discovery hit its deadline");
    }

    for name in hub.registry().service_names() {
        match hub.test_connection(name).await {
            Ok(probe) if probe.ok => {
                info!(service = %name, latency_ms = probe.latency_ms, "[Probe] Reachable")
            }
            Ok(probe) => warn!(
                service = %name,
                error = probe.error.as_deref().unwrap_or("unknown"),
                "[Probe] Unreachable"
            ),
            Err(e) => warn!(service = %name, error = %e, "[Probe] Test connection failed"),
        }
    }

    let snapshot = serde_json::to_string_pretty(&hub.snapshot())?;
    println!("{snapshot}");

    hub.shutdown().await;
    Ok(())
}
