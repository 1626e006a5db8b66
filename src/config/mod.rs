//! Configuration module
//!
//! This module handles application configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the configuration.
//!
//! Sources are merged lowest to highest priority: defaults, JSON file,
//! `MITMPROXY_*` environment variables, command line. The result is resolved
//! once at startup and handed to constructors; nothing reads the environment
//! afterwards.

// Submodules
mod defaults;
mod loader;
pub mod mapping;
mod merger;
mod validator;

// Re-export types and traits
pub use self::loader::ConfigLoader;
pub use self::mapping::{LocalMapping, MappingConfig, RemoteMapping};
pub use self::merger::ConfigMerger;
pub use self::validator::{check_warnings, validate_config, ConfigValidator};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ca::Authority;
use crate::common::{parse_socket_addr, Result};

/// Custom deserializer for socket addresses
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_socket_addr(&s).map_err(serde::de::Error::custom)
}

/// Proxy configuration
///
/// Contains every option the CA, the TLS engine factory, the upstream client
/// and the admin server are built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct ProxyConfig {
    // --- Network settings ---

    /// Listen address handed to the proxy transport
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub listen: SocketAddr,

    /// Listen address for the admin HTTP server
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub admin_listen: SocketAddr,

    /// Only accept clients on loopback addresses
    pub allow_local_only: bool,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Byte budget for request and response bodies held for capture
    pub max_buffer_size: usize,

    // --- Certificate authority settings ---

    /// Directory holding `<alias>.p12` and `<alias>.pem`
    pub cert_dir: PathBuf,

    /// CA identity
    pub authority: Authority,

    /// Seconds a cached leaf may sit unused before it is re-minted
    pub leaf_cache_idle_secs: u64,

    // --- Upstream trust settings ---

    /// Accept any origin certificate. Insecure; explicit opt-in only.
    pub trust_all_servers: bool,

    /// Present the CA certificate as client certificate toward origins
    pub send_client_certs: bool,

    /// Extra PEM bundle trusted alongside the CA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_store: Option<PathBuf>,

    // --- Upstream timeouts ---

    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,

    // --- Rules ---

    /// Mapping rules registered at startup
    pub mappings: MappingConfig,
}

impl Default for ProxyConfig {
    /// Create a default configuration using centralized defaults
    #[inline]
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            admin_listen: defaults::admin_listen(),
            allow_local_only: false,
            log_level: defaults::log_level(),
            max_buffer_size: defaults::max_buffer_size(),
            cert_dir: defaults::cert_dir(),
            authority: defaults::authority(),
            leaf_cache_idle_secs: defaults::leaf_cache_idle_secs(),
            trust_all_servers: false,
            send_client_certs: defaults::send_client_certs(),
            trust_store: None,
            connect_timeout_secs: defaults::connect_timeout_secs(),
            read_timeout_secs: defaults::read_timeout_secs(),
            write_timeout_secs: defaults::write_timeout_secs(),
            mappings: MappingConfig::default(),
        }
    }
}

impl ProxyConfig {
    pub fn leaf_cache_idle(&self) -> Duration {
        Duration::from_secs(self.leaf_cache_idle_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_config(self)
    }
}

// Implement AsRef<ProxyConfig> for ProxyConfig to simplify merge operations
impl AsRef<ProxyConfig> for ProxyConfig {
    #[inline]
    fn as_ref(&self) -> &ProxyConfig {
        self
    }
}

/// Log the configuration
pub fn log_config(config: &ProxyConfig) {
    // Only log in info level or below
    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Final Configuration ===");

    info!("Network Settings:");
    info!("  Listen address: {}", config.listen);
    info!("  Admin address: {}", config.admin_listen);
    info!("  Local clients only: {}", config.allow_local_only);

    info!("General Settings:");
    info!("  Log level: {}", config.log_level);
    info!("  Capture budget: {} bytes", config.max_buffer_size);

    info!("Certificate Authority:");
    info!("  Directory: {}", config.cert_dir.display());
    info!("  Alias: {}", config.authority.alias);
    info!("  Common name: {}", config.authority.common_name);
    info!("  Leaf idle timeout: {} seconds", config.leaf_cache_idle_secs);

    info!("Upstream:");
    info!("  Trust all servers: {}", config.trust_all_servers);
    info!("  Send client certificates: {}", config.send_client_certs);
    if let Some(ref path) = config.trust_store {
        info!("  Trust store: {}", path.display());
    }
    info!(
        "  Timeouts (connect/read/write): {}s/{}s/{}s",
        config.connect_timeout_secs, config.read_timeout_secs, config.write_timeout_secs
    );

    info!(
        "Mappings: {} local, {} remote",
        config.mappings.local.len(),
        config.mappings.remote.len()
    );

    info!("=========================");
}

// Export constants needed externally
pub use defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();

        assert_eq!(config.listen.to_string(), "0.0.0.0:8888");
        assert_eq!(config.admin_listen.to_string(), "127.0.0.1:8889");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.authority.alias, "mitmproxy");
        assert!(!config.trust_all_servers);
        assert!(config.send_client_certs);
        assert_eq!(config.leaf_cache_idle(), Duration::from_secs(300));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert!(config.mappings.is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ProxyConfig = serde_json::from_str(
            r#"{"admin_listen": "127.0.0.1:9999", "authority": {"alias": "corp"}}"#,
        )
        .unwrap();

        assert_eq!(config.admin_listen.port(), 9999);
        assert_eq!(config.authority.alias, "corp");
        assert_eq!(config.authority.common_name, "mitmproxy");
        assert_eq!(config.listen, defaults::listen());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_json::from_str::<ProxyConfig>(r#"{"target": "x"}"#).is_err());
    }
}
