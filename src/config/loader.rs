//! Configuration loading functionality
//!
//! This module provides functionality for loading configuration from files
//! and environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};

use crate::common::{parse_socket_addr, ProxyError, Result};
use crate::config::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
use crate::config::merger::ConfigMerger;
use crate::config::ProxyConfig;

/// Trait for loading configuration from different sources
pub trait ConfigLoader {
    /// Load configuration from a JSON file
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self>
    where
        Self: Sized;

    /// Load configuration from `MITMPROXY_*` environment variables
    ///
    /// Unset variables keep their defaults.
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Defaults, then the file (explicit or `config.json` when present), then
    /// the environment
    fn load(config_file: Option<&Path>) -> Result<Self>
    where
        Self: Sized;
}

impl ConfigLoader for ProxyConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_display = path.display();

        let content = fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file {}: {}", path_display, e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("Failed to parse JSON config file {}: {}", path_display, e)))
    }

    fn from_env() -> Result<Self> {
        let get_env = |name: &str| -> Option<String> { env::var(format!("{}{}", ENV_PREFIX, name)).ok() };

        fn parse<T: FromStr>(name: &str, value: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            value
                .trim()
                .parse()
                .map_err(|e| ProxyError::Config(format!("Invalid value for {}{}: {}", ENV_PREFIX, name, e)))
        }

        let mut config = Self::default();

        // Network settings
        if let Some(value) = get_env("LISTEN") {
            config.listen = parse_socket_addr(&value)?;
        }
        if let Some(value) = get_env("ADMIN_LISTEN") {
            config.admin_listen = parse_socket_addr(&value)?;
        }
        if let Some(value) = get_env("ALLOW_LOCAL_ONLY") {
            config.allow_local_only = parse("ALLOW_LOCAL_ONLY", &value)?;
        }

        // General settings
        if let Some(value) = get_env("LOG_LEVEL") {
            config.log_level = value;
        }
        if let Some(value) = get_env("MAX_BUFFER_SIZE") {
            config.max_buffer_size = parse("MAX_BUFFER_SIZE", &value)?;
        }

        // Certificate authority
        if let Some(value) = get_env("CERT_DIR") {
            config.cert_dir = PathBuf::from(value);
        }
        if let Some(value) = get_env("ALIAS") {
            config.authority.alias = value;
        }
        if let Some(value) = get_env("PASSWORD") {
            config.authority.password = value;
        }
        if let Some(value) = get_env("LEAF_CACHE_IDLE_SECS") {
            config.leaf_cache_idle_secs = parse("LEAF_CACHE_IDLE_SECS", &value)?;
        }

        // Upstream
        if let Some(value) = get_env("TRUST_ALL_SERVERS") {
            config.trust_all_servers = parse("TRUST_ALL_SERVERS", &value)?;
        }
        if let Some(value) = get_env("SEND_CLIENT_CERTS") {
            config.send_client_certs = parse("SEND_CLIENT_CERTS", &value)?;
        }
        if let Some(value) = get_env("TRUST_STORE") {
            config.trust_store = Some(PathBuf::from(value));
        }
        if let Some(value) = get_env("CONNECT_TIMEOUT_SECS") {
            config.connect_timeout_secs = parse("CONNECT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get_env("READ_TIMEOUT_SECS") {
            config.read_timeout_secs = parse("READ_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get_env("WRITE_TIMEOUT_SECS") {
            config.write_timeout_secs = parse("WRITE_TIMEOUT_SECS", &value)?;
        }

        Ok(config)
    }

    fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        debug!("Starting with default configuration");

        match config_file {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                config = config.merge(Self::from_file(path)?);
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
                match Self::from_file(DEFAULT_CONFIG_FILE) {
                    Ok(file_config) => config = config.merge(file_config),
                    Err(e) => warn!("Ignoring {}: {}", DEFAULT_CONFIG_FILE, e),
                }
            }
            None => debug!("No configuration file"),
        }

        let env_config = Self::from_env()?;
        if env_config != Self::default() {
            info!("Applying configuration from environment variables");
            config = config.merge(env_config);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"log_level": "debug", "trust_all_servers": true, "read_timeout_secs": 5}}"#
        )
        .unwrap();

        let config = ProxyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.trust_all_servers);
        assert_eq!(config.read_timeout_secs, 5);
        assert_eq!(config.write_timeout_secs, 30);
    }

    #[test]
    fn test_from_missing_file() {
        let result = ProxyConfig::from_file("/nonexistent/mitm-proxy.json");
        assert!(matches!(result, Err(ProxyError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("MITMPROXY_ADMIN_LISTEN", "127.0.0.1:7000");
        env::set_var("MITMPROXY_TRUST_ALL_SERVERS", "true");
        env::set_var("MITMPROXY_ALIAS", "corp");

        let config = ProxyConfig::from_env();

        env::remove_var("MITMPROXY_ADMIN_LISTEN");
        env::remove_var("MITMPROXY_TRUST_ALL_SERVERS");
        env::remove_var("MITMPROXY_ALIAS");

        let config = config.unwrap();
        assert_eq!(config.admin_listen.port(), 7000);
        assert!(config.trust_all_servers);
        assert_eq!(config.authority.alias, "corp");
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_value() {
        env::set_var("MITMPROXY_READ_TIMEOUT_SECS", "soon");
        let result = ProxyConfig::from_env();
        env::remove_var("MITMPROXY_READ_TIMEOUT_SECS");

        assert!(matches!(result, Err(ProxyError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"log_level": "debug", "cert_dir": "/tmp/ca"}}"#).unwrap();

        env::set_var("MITMPROXY_LOG_LEVEL", "trace");
        let config = ProxyConfig::load(Some(file.path()));
        env::remove_var("MITMPROXY_LOG_LEVEL");

        let config = config.unwrap();
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.cert_dir, PathBuf::from("/tmp/ca"));
    }
}
