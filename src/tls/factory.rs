//! TLS engine factory
//!
//! Hands the transport collaborator one `Ssl` per connection leg:
//!
//! * server role (proxy toward client): presents an impersonated leaf for the
//!   requested host, issued on demand by the [`Impersonator`]
//! * client role (proxy toward origin): verifies the origin with the
//!   [`MergedTrust`] policy, or accepts anything in explicit insecure mode

use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::{X509StoreContextRef, X509VerifyResult, X509};

use crate::ca::{CertificateAuthority, SubjectAltName};
use crate::common::Result;
use crate::tls::impersonator::{CacheStats, Impersonator, LeafContext};
use crate::tls::policy;
use crate::tls::trust::{owned_chain, MergedTrust};

/// Client-role options
#[derive(Debug, Clone, Default)]
pub struct ClientTrustOptions {
    /// Accept every origin certificate. Explicit opt-in only.
    pub trust_all_servers: bool,

    /// Present the CA certificate as client certificate toward origins
    pub send_client_certs: bool,

    /// Extra roots trusted alongside the proxy CA
    pub extra_roots: Vec<X509>,
}

/// Builds server- and client-role TLS engines
pub struct TlsEngineFactory {
    impersonator: Arc<Impersonator>,
    trust: Arc<MergedTrust>,
    client_context: SslContext,
    trust_all_servers: bool,
    protocol: SslVersion,
}

impl TlsEngineFactory {
    /// Create the factory
    ///
    /// The client-role context is built once; server-role contexts come from
    /// the impersonation cache.
    ///
    /// # Parameters
    ///
    /// * `impersonator` - Source of per-host server contexts
    /// * `options` - Client-role trust options
    pub fn new(impersonator: Arc<Impersonator>, options: ClientTrustOptions) -> Result<Self> {
        let ca = Arc::clone(impersonator.authority());

        let mut custom_roots = vec![ca.certificate().to_owned()];
        custom_roots.extend(options.extra_roots.iter().cloned());
        let trust = Arc::new(MergedTrust::new(custom_roots)?);

        let (client_context, protocol) = client_context(&ca, &trust, &options)?;

        if options.trust_all_servers {
            warn!("Origin certificates will NOT be verified (trust_all_servers enabled)");
        }
        info!("TLS engines limited to {}", protocol_name(protocol));

        Ok(Self {
            impersonator,
            trust,
            client_context,
            trust_all_servers: options.trust_all_servers,
            protocol,
        })
    }

    /// Server-role engine impersonating `host`
    ///
    /// Fails with [`ProxyError::LeafCertificate`](crate::common::ProxyError::LeafCertificate)
    /// when no leaf can be issued; only this connection is affected.
    pub fn server_engine(&self, host: &str, subject_alt_names: &[SubjectAltName]) -> Result<Ssl> {
        let leaf = self.impersonator.get_or_create_context(host, subject_alt_names)?;
        self.accepting(&leaf)
    }

    /// Server-role engine impersonating the origin that presented `upstream`
    pub fn server_engine_for_upstream(&self, upstream: &X509) -> Result<Ssl> {
        let leaf = self.impersonator.context_for_upstream(upstream)?;
        self.accepting(&leaf)
    }

    /// Client-role engine not bound to a particular origin
    pub fn client_engine(&self) -> Result<Ssl> {
        let mut ssl = Ssl::new(&self.client_context)?;
        ssl.set_connect_state();
        Ok(ssl)
    }

    /// Client-role engine for `host:port`
    ///
    /// Sets SNI and, unless trust-all mode is on, binds verification to the
    /// host. If the host cannot be configured for verification the engine is
    /// still returned and a warning is logged.
    pub fn client_engine_for(&self, host: &str, port: u16) -> Result<Ssl> {
        let mut ssl = self.client_engine()?;

        let ip = host.parse::<IpAddr>().ok();
        if ip.is_none() {
            ssl.set_hostname(host)?;
        }

        if !self.trust_all_servers {
            let bound = match ip {
                Some(ip) => ssl.param_mut().set_ip(ip),
                None => ssl.param_mut().set_host(host),
            };
            if let Err(e) = bound {
                warn!(
                    "Hostname verification unavailable for {}:{}, continuing without it: {}",
                    host, port, e
                );
            }
        }

        debug!("Client engine for {}:{}", host, port);
        Ok(ssl)
    }

    /// The merged trust policy used by client-role engines
    pub fn trust(&self) -> &Arc<MergedTrust> {
        &self.trust
    }

    /// The CA that signs every impersonated leaf
    pub fn certificate_authority(&self) -> &Arc<CertificateAuthority> {
        self.impersonator.authority()
    }

    /// Impersonation cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.impersonator.stats()
    }

    /// Highest protocol version engines negotiate
    pub fn protocol(&self) -> SslVersion {
        self.protocol
    }

    fn accepting(&self, leaf: &LeafContext) -> Result<Ssl> {
        let mut ssl = Ssl::new(leaf.context())?;
        ssl.set_accept_state();
        Ok(ssl)
    }
}

fn client_context(
    ca: &CertificateAuthority,
    trust: &Arc<MergedTrust>,
    options: &ClientTrustOptions,
) -> Result<(SslContext, SslVersion)> {
    let mut builder = SslContextBuilder::new(SslMethod::tls_client())?;
    let protocol = policy::apply(&mut builder)?;

    if options.send_client_certs {
        builder.set_certificate(ca.certificate())?;
        builder.set_private_key(ca.private_key())?;
    }

    if options.trust_all_servers {
        builder.set_verify(SslVerifyMode::NONE);
    } else {
        // OpenSSL's own pass runs against the custom store; failures fall back
        // to the full merged policy
        builder.set_cert_store(trust.custom_store()?);
        let trust = Arc::clone(trust);
        builder.set_verify_callback(SslVerifyMode::PEER, move |preverified, ctx| {
            preverified || fallback_verify(&trust, ctx)
        });
    }

    Ok((builder.build(), protocol))
}

/// Re-check a chain OpenSSL rejected for lack of a trusted root
fn fallback_verify(trust: &MergedTrust, ctx: &mut X509StoreContextRef) -> bool {
    let error = ctx.error();
    if !is_untrusted_root(error) {
        return false;
    }

    let chain = ctx.chain().map(|chain| owned_chain(chain)).unwrap_or_default();
    match trust.check_server_trusted(&chain) {
        Ok(()) => {
            debug!("Origin chain accepted by fallback trust store");
            true
        }
        Err(e) => {
            warn!("Origin certificate rejected: {} ({})", e, error);
            false
        }
    }
}

fn is_untrusted_root(error: X509VerifyResult) -> bool {
    matches!(
        error.as_raw(),
        openssl_sys::X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT
            | openssl_sys::X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT
            | openssl_sys::X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN
            | openssl_sys::X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY
            | openssl_sys::X509_V_ERR_CERT_UNTRUSTED
    )
}

fn protocol_name(version: SslVersion) -> &'static str {
    if version == SslVersion::TLS1_2 {
        "TLSv1.2"
    } else {
        "TLSv1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::Authority;
    use crate::tls::policy::has_weak_cipher;

    fn factory(options: ClientTrustOptions) -> TlsEngineFactory {
        let ca = Arc::new(CertificateAuthority::create(Authority::default()).unwrap());
        TlsEngineFactory::new(Arc::new(Impersonator::new(ca)), options).unwrap()
    }

    #[test]
    fn test_no_engine_offers_weak_suites() {
        let factory = factory(ClientTrustOptions::default());

        let server = factory.server_engine("weak.example", &[]).unwrap();
        let client = factory.client_engine_for("weak.example", 443).unwrap();
        let unbound = factory.client_engine().unwrap();

        for ssl in [&server, &client, &unbound] {
            assert!(!has_weak_cipher(ssl));
        }
    }

    #[test]
    fn test_server_engines_share_cached_leaf() {
        let factory = factory(ClientTrustOptions::default());
        factory.server_engine("cached.example", &[]).unwrap();
        factory.server_engine("cached.example", &[]).unwrap();

        let stats = factory.cache_stats();
        assert_eq!(stats.issued, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_client_engine_sets_sni() {
        let factory = factory(ClientTrustOptions::default());
        let ssl = factory.client_engine_for("origin.example", 443).unwrap();
        assert_eq!(
            ssl.servername(openssl::ssl::NameType::HOST_NAME),
            Some("origin.example")
        );

        let ssl = factory.client_engine_for("127.0.0.1", 8443).unwrap();
        assert_eq!(ssl.servername(openssl::ssl::NameType::HOST_NAME), None);
    }

    #[test]
    fn test_trust_includes_proxy_ca() {
        let factory = factory(ClientTrustOptions {
            send_client_certs: true,
            ..ClientTrustOptions::default()
        });
        let leaf = factory.server_engine("self.example", &[]).unwrap();
        let chain = vec![leaf.certificate().unwrap().to_owned()];

        assert!(factory.trust().check_server_trusted(&chain).is_ok());
        assert!(factory.protocol() == SslVersion::TLS1_2);
    }
}
