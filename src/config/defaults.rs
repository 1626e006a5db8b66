//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is the single source of truth for defaults, so the serde defaults,
//! `ProxyConfig::default()` and the merge logic always agree.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::ca::Authority;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "MITMPROXY_";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default proxy port
pub const LISTEN_PORT: u16 = 8888;

/// Default admin port
pub const ADMIN_PORT: u16 = 8889;

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default CA artifact directory
pub const CERT_DIR_STR: &str = "certs";

/// Default capture budget (100 MiB)
pub const MAX_BUFFER_SIZE: usize = 100 * 1024 * 1024;

/// Default idle time before a cached leaf is re-minted
pub const LEAF_CACHE_IDLE_SECS: u64 = 300;

/// Default upstream timeout, applied to connect, read and write alike
pub const UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Default listen address for the proxy transport
pub fn listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), LISTEN_PORT)
}

/// Default listen address for the admin server
pub fn admin_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), ADMIN_PORT)
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default CA artifact directory
pub fn cert_dir() -> PathBuf {
    PathBuf::from(CERT_DIR_STR)
}

/// Default CA identity
pub fn authority() -> Authority {
    Authority::default()
}

/// Present the CA as client certificate toward origins
pub fn send_client_certs() -> bool {
    true
}

pub fn max_buffer_size() -> usize {
    MAX_BUFFER_SIZE
}

pub fn leaf_cache_idle_secs() -> u64 {
    LEAF_CACHE_IDLE_SECS
}

pub fn connect_timeout_secs() -> u64 {
    UPSTREAM_TIMEOUT_SECS
}

pub fn read_timeout_secs() -> u64 {
    UPSTREAM_TIMEOUT_SECS
}

pub fn write_timeout_secs() -> u64 {
    UPSTREAM_TIMEOUT_SECS
}
