//! Attachment point for the proxy transport
//!
//! [`MitmManager`] bundles everything a socket-level transport needs: TLS
//! engines for both legs of an intercepted connection and one
//! [`Interceptor`] per request/response cycle.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info};
use openssl::ssl::Ssl;
use openssl::x509::X509;

use crate::ca::{CertificateAuthority, SubjectAltName};
use crate::common::{BufferPool, Result};
use crate::config::ProxyConfig;
use crate::flow::FlowStore;
use crate::mapping::MappingRegistry;
use crate::pipeline::{HttpRequest, Interceptor, Middleware, ProxyContext};
use crate::tls::{CacheStats, ClientTrustOptions, Impersonator, MergedTrust, TlsEngineFactory};
use crate::upstream::{UpstreamClient, UpstreamOptions};

/// Roots trusted on top of the platform store: the proxy CA, then the
/// configured trust store
pub fn trusted_roots(config: &ProxyConfig, ca: &CertificateAuthority) -> Result<Vec<X509>> {
    let mut roots = vec![ca.certificate().to_owned()];
    if let Some(ref path) = config.trust_store {
        let extra = MergedTrust::load_pem_bundle(path)?;
        debug!("Loaded {} roots from {}", extra.len(), path.display());
        roots.extend(extra);
    }
    Ok(roots)
}

/// Settings for the default upstream client
pub fn upstream_options(config: &ProxyConfig, ca: &CertificateAuthority) -> Result<UpstreamOptions> {
    Ok(UpstreamOptions {
        connect_timeout: config.connect_timeout(),
        read_timeout: config.read_timeout(),
        write_timeout: config.write_timeout(),
        trust_all_servers: config.trust_all_servers,
        extra_roots: trusted_roots(config, ca)?,
    })
}

/// Facade handed to the transport
pub struct MitmManager {
    engines: TlsEngineFactory,
    context: Arc<ProxyContext>,
    allow_local_only: bool,
}

impl MitmManager {
    /// Wire the engine factory, the stores and the pipeline together
    ///
    /// The mapping rules declared in `config` are registered here.
    ///
    /// # Parameters
    ///
    /// * `ca` - Root CA, already loaded
    /// * `config` - Resolved configuration
    /// * `upstream` - Client used by remote mappings
    pub fn new(
        ca: Arc<CertificateAuthority>,
        config: &ProxyConfig,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Result<Self> {
        let impersonator = Arc::new(Impersonator::with_idle_timeout(
            Arc::clone(&ca),
            config.leaf_cache_idle(),
        ));

        // The factory always trusts the CA itself
        let extra_roots = trusted_roots(config, &ca)?.into_iter().skip(1).collect();
        let engines = TlsEngineFactory::new(
            impersonator,
            ClientTrustOptions {
                trust_all_servers: config.trust_all_servers,
                send_client_certs: config.send_client_certs,
                extra_roots,
            },
        )?;

        let mappings = Arc::new(MappingRegistry::new());
        config.mappings.apply(&mappings)?;

        let context = ProxyContext::new(mappings, Arc::new(FlowStore::new()), upstream)
            .with_buffers(BufferPool::new(config.max_buffer_size));

        info!("MITM manager ready (CA: {})", ca.authority().common_name);

        Ok(Self {
            engines,
            context: Arc::new(context),
            allow_local_only: config.allow_local_only,
        })
    }

    /// Replace the bootstrap middlewares run first on both legs
    ///
    /// Interceptors created earlier keep the chain they were built with.
    pub fn with_bootstrap(mut self, bootstrap: Vec<Arc<dyn Middleware>>) -> Self {
        let context = ProxyContext {
            mappings: Arc::clone(&self.context.mappings),
            flows: Arc::clone(&self.context.flows),
            upstream: Arc::clone(&self.context.upstream),
            buffers: self.context.buffers.clone(),
            bootstrap,
        };
        self.context = Arc::new(context);
        self
    }

    /// Server-role engine for a client that asked for `host`
    pub fn server_engine(&self, host: &str, subject_alt_names: &[SubjectAltName]) -> Result<Ssl> {
        self.engines.server_engine(host, subject_alt_names)
    }

    /// Server-role engine mirroring the origin certificate
    pub fn server_engine_for_upstream(&self, upstream: &X509) -> Result<Ssl> {
        self.engines.server_engine_for_upstream(upstream)
    }

    /// Client-role engine toward `host:port`
    pub fn client_engine_for(&self, host: &str, port: u16) -> Result<Ssl> {
        self.engines.client_engine_for(host, port)
    }

    /// Start intercepting one request
    pub fn interceptor(&self, request: HttpRequest, tls: bool) -> Interceptor {
        Interceptor::new(Arc::clone(&self.context), request, tls)
    }

    /// Whether a client at `peer` may use the proxy
    pub fn accepts_peer(&self, peer: &SocketAddr) -> bool {
        !self.allow_local_only || peer.ip().is_loopback()
    }

    pub fn engines(&self) -> &TlsEngineFactory {
        &self.engines
    }

    pub fn certificate_authority(&self) -> &Arc<CertificateAuthority> {
        self.engines.certificate_authority()
    }

    pub fn mappings(&self) -> &Arc<MappingRegistry> {
        &self.context.mappings
    }

    pub fn flows(&self) -> &Arc<FlowStore> {
        &self.context.flows
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engines.cache_stats()
    }
}
