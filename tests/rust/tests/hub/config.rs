//! Layered configuration feeding the hub

use std::io::Write;

use pretty_assertions::assert_eq;
use svcmux_core::{ConfigError, ConfigLayer, ConfigLoader, PoolLimits, ServiceOverride};
use svcmux_gateway::ServiceHub;
use tests::fixtures::socket_service;
use tests::{ConnectivityConfig, MockTransport, FakeService};

fn defaults() -> ConnectivityConfig {
    ConnectivityConfig::new(vec![socket_service("comfyui"), socket_service("llm")])
}

#[test]
fn test_profile_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "services": {{
                "comfyui": {{ "default_port": 8188, "pool": {{ "min": 1, "max": 6 }} }}
            }},
            "health": {{ "interval_ms": 10000, "unhealthy_threshold": 5 }}
        }}"#
    )
    .unwrap();

    let config = ConfigLoader::new(defaults())
        .with_profile_file(file.path())
        .unwrap()
        .with_layer(ConfigLayer::default().service(
            "comfyui",
            ServiceOverride {
                queue_capacity: Some(8),
                ..Default::default()
            },
        ))
        .resolve()
        .unwrap();

    let comfy = config.service("comfyui").unwrap();
    assert_eq!(comfy.default_port, 8188);
    assert_eq!(comfy.pool, PoolLimits { min: 1, max: 6 });
    assert_eq!(comfy.queue_capacity, 8);
    assert_eq!(config.health.interval_ms, 10_000);
    assert_eq!(config.health.unhealthy_threshold, 5);
    // Untouched service keeps its defaults
    assert_eq!(config.service("llm").unwrap().default_port, 9000);
}

#[test]
fn test_missing_profile_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigLoader::new(defaults())
        .with_profile_file(&dir.path().join("profile.json"))
        .unwrap()
        .resolve()
        .unwrap();
    assert_eq!(config, defaults());
}

#[test]
fn test_invalid_override_is_rejected() {
    let err = ConfigLoader::new(defaults())
        .with_layer(ConfigLayer::default().service(
            "comfyui",
            ServiceOverride {
                pool: Some(PoolLimits { min: 5, max: 2 }),
                ..Default::default()
            },
        ))
        .resolve()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref service, .. } if service == "comfyui"));
}

#[test]
fn test_builder_rejects_transport_for_unknown_service() {
    let result = ServiceHub::builder(defaults())
        .with_transport("ghost", MockTransport::new(FakeService::new("ghost")))
        .build();
    assert!(matches!(result, Err(ConfigError::UnknownService(name)) if name == "ghost"));
}

#[test]
fn test_builder_rejects_duplicate_services() {
    let config = ConnectivityConfig::new(vec![socket_service("llm"), socket_service("llm")]);
    let result = ServiceHub::builder(config).build();
    assert!(matches!(result, Err(ConfigError::DuplicateService(name)) if name == "llm"));
}
