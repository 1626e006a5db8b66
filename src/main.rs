//! MITM Proxy Command Line Tool
//!
//! This binary loads the root CA, builds the interception core and serves the
//! admin API until Ctrl+C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

// Import our library
use mitm_proxy::admin::{start_admin_server, AdminState};
use mitm_proxy::common::{init_logger, parse_socket_addr, ProxyError, Result};
use mitm_proxy::config::{self, ConfigLoader, ConfigMerger, ConfigValidator, ProxyConfig};
use mitm_proxy::manager::upstream_options;
use mitm_proxy::{CertificateAuthority, HttpUpstream, MitmManager, APP_NAME, VERSION};

/// MITM Proxy: intercepting HTTP(S) proxy core
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Load configuration from a JSON file
    #[arg(short, long, env = "MITMPROXY_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Listen address handed to the proxy transport
    #[arg(short, long, value_parser = parse_addr)]
    listen: Option<SocketAddr>,

    /// Admin API listen address
    #[arg(long, value_parser = parse_addr)]
    admin_listen: Option<SocketAddr>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Directory holding the root CA key store and PEM
    #[arg(long)]
    cert_dir: Option<PathBuf>,

    /// Extra PEM bundle of trusted roots
    #[arg(long)]
    trust_store: Option<PathBuf>,

    /// Accept any origin certificate (insecure)
    #[arg(long)]
    trust_all_servers: bool,

    /// Only accept clients on loopback addresses
    #[arg(long)]
    allow_local_only: bool,
}

impl Args {
    /// Command line values as a configuration layer
    ///
    /// Flags left unset keep their defaults, so they never override lower
    /// priority sources when merged.
    fn to_config(&self) -> ProxyConfig {
        let mut config = ProxyConfig::default();

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(admin_listen) = self.admin_listen {
            config.admin_listen = admin_listen;
        }
        if let Some(ref level) = self.log_level {
            config.log_level = level.clone();
        }
        if let Some(ref dir) = self.cert_dir {
            config.cert_dir = dir.clone();
        }
        config.trust_store = self.trust_store.clone();
        config.trust_all_servers = self.trust_all_servers;
        config.allow_local_only = self.allow_local_only;

        config
    }
}

fn parse_addr(value: &str) -> std::result::Result<SocketAddr, String> {
    parse_socket_addr(value).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Resolve configuration: defaults, file, environment, command line
    let config = ProxyConfig::load(args.config_file.as_deref())?.merge(args.to_config());

    // Initialize logger
    init_logger(&config.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);

    config.validate()?;
    for warning in config.check_warnings() {
        warn!("{}", warning);
    }
    config::log_config(&config);

    // Root CA, fatal when it cannot be loaded or created
    let ca = match CertificateAuthority::load_or_create(config.authority.clone(), &config.cert_dir) {
        Ok(ca) => Arc::new(ca),
        Err(e) => {
            error!("Unable to set up the root certificate: {}", e);
            return Err(e);
        }
    };

    // The blocking client must live outside the async runtime
    let upstream = Arc::new(HttpUpstream::new(&upstream_options(&config, &ca)?)?);

    let manager = MitmManager::new(Arc::clone(&ca), &config, upstream)?;
    info!(
        "Interception core ready: {} local and {} remote mappings, root CA at {}",
        manager.mappings().locals().len(),
        manager.mappings().remotes().len(),
        config.authority.pem_path(&config.cert_dir).display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let state = AdminState::new(Arc::clone(manager.flows()), ca);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", e);
        }
        info!("Shutting down");
    };

    info!("Admin API ready, press Ctrl+C to stop");
    let served = runtime.block_on(start_admin_server(config.admin_listen, state, shutdown));

    // Tear the runtime down before the blocking client goes away
    drop(runtime);
    drop(manager);

    served.map_err(|e| ProxyError::Other(e.to_string()))
}
