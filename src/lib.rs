//! MITM Proxy: intercepting HTTP(S) proxy core
//!
//! This library implements everything an intercepting proxy needs above the
//! socket layer:
//!
//! - A self-signed root CA that mints per-host leaf certificates on demand
//!   and caches them
//! - A TLS engine factory for both legs of an intercepted connection, with
//!   origin verification against the platform roots merged with the proxy CA
//! - A per-request middleware pipeline that serves local stubs, rewrites
//!   requests to other origins and records every completed exchange
//! - A queryable flow store and a small admin HTTP surface over it
//!
//! The socket-level transport (accepting clients, CONNECT tunnels, HTTP
//! framing) attaches through [`MitmManager`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mitm_proxy::{CertificateAuthority, HttpUpstream, MitmManager, Result};
//! use mitm_proxy::ca::Authority;
//! use mitm_proxy::config::ProxyConfig;
//! use mitm_proxy::upstream::UpstreamOptions;
//!
//! fn main() -> Result<()> {
//!     let config = ProxyConfig::default();
//!     let ca = Arc::new(CertificateAuthority::load_or_create(
//!         Authority::default(),
//!         &config.cert_dir,
//!     )?);
//!     let upstream = Arc::new(HttpUpstream::new(&UpstreamOptions::default())?);
//!     let manager = MitmManager::new(ca, &config, upstream)?;
//!
//!     // Handshake with a client that asked for example.com
//!     let _ssl = manager.server_engine("example.com", &[])?;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod admin;
pub mod ca;
pub mod common;
pub mod config;
pub mod flow;
pub mod manager;
pub mod mapping;
pub mod pipeline;
pub mod tls;
pub mod upstream;

// Re-export commonly used structures and functions for convenience
pub use ca::CertificateAuthority;
pub use common::{parse_socket_addr, ProxyError, Result};
pub use flow::{Flow, FlowStore};
pub use manager::MitmManager;
pub use mapping::MappingRegistry;
pub use pipeline::Interceptor;
pub use tls::TlsEngineFactory;
pub use upstream::{HttpUpstream, UpstreamClient};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
