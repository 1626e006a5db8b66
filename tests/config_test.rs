//! Configuration resolution from files and the environment

use std::env;
use std::fs;
use std::sync::Arc;

use mitm_proxy::config::{validate_config, ConfigLoader, ConfigMerger, ProxyConfig};
use mitm_proxy::mapping::{Location, MappingRegistry};
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn test_file_then_environment() {
    let dir = TempDir::new().unwrap();
    let stub = dir.path().join("stub.json");
    fs::write(&stub, r#"{"ok": true}"#).unwrap();

    let path = dir.path().join("proxy.json");
    let config = format!(
        r#"{{
            "admin_listen": "127.0.0.1:9100",
            "leaf_cache_idle_secs": 60,
            "mappings": {{
                "local": [{{"from": {{"path": "/status"}}, "file": {:?}}}],
                "remote": [{{"from": {{"host": "legacy\\.example"}}, "to": {{"host": "modern.example"}}}}]
            }}
        }}"#,
        stub.display().to_string()
    );
    fs::write(&path, config).unwrap();

    env::set_var("MITMPROXY_LEAF_CACHE_IDLE_SECS", "120");
    let config = ProxyConfig::load(Some(&path));
    env::remove_var("MITMPROXY_LEAF_CACHE_IDLE_SECS");

    let config = config.unwrap();
    assert_eq!(config.admin_listen.port(), 9100);
    assert_eq!(config.leaf_cache_idle_secs, 120);
    assert!(validate_config(&config).is_ok());

    let registry = Arc::new(MappingRegistry::new());
    config.mappings.apply(&registry).unwrap();

    let status = Location {
        scheme: "http".to_string(),
        host: Some("any.example".to_string()),
        path: "/status".to_string(),
        query: None,
    };
    assert_eq!(&registry.find_local(&status).unwrap()[..], br#"{"ok": true}"#);

    let legacy = Location {
        host: Some("legacy.example".to_string()),
        path: "/".to_string(),
        ..status
    };
    assert_eq!(
        registry.find_remote(&legacy).unwrap().host.as_deref(),
        Some("modern.example")
    );
}

#[test]
fn test_unknown_fields_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("proxy.json");
    fs::write(&path, r#"{"target": "127.0.0.1:6000"}"#).unwrap();

    assert!(ProxyConfig::from_file(&path).is_err());
}

#[test]
fn test_command_line_layer_wins() {
    let mut file = ProxyConfig::default();
    file.log_level = "debug".to_string();
    file.trust_all_servers = true;

    let mut cli = ProxyConfig::default();
    cli.log_level = "warn".to_string();

    let merged = file.merge(cli);
    assert_eq!(merged.log_level, "warn");
    assert!(merged.trust_all_servers);
}
