//! Merged trust policy for the proxy-as-client role
//!
//! Two delegates are consulted: a custom store (the proxy's own CA plus any
//! configured extra roots) and the platform default store. Server chains are
//! tried against the custom store first, client chains against the platform
//! store first; a chain is rejected only when both delegates reject it.

use std::collections::HashSet;
use std::path::Path;

use log::debug;
use openssl::error::ErrorStack;
use openssl::stack::Stack;
use openssl::x509::store::{X509Store, X509StoreBuilder, X509StoreRef};
use openssl::x509::{X509Ref, X509StoreContext, X509};

use crate::common::fs::read_file;
use crate::common::{ProxyError, Result};

/// Trust delegates with asymmetric fallback
pub struct MergedTrust {
    custom_roots: Vec<X509>,
    custom: X509Store,
    platform: X509Store,
}

impl MergedTrust {
    /// Build the delegates
    ///
    /// # Parameters
    ///
    /// * `custom_roots` - Certificates trusted in addition to the platform store
    pub fn new(custom_roots: Vec<X509>) -> Result<Self> {
        let custom = build_store(&custom_roots)?;

        let mut platform = X509StoreBuilder::new()?;
        platform.set_default_paths()?;

        Ok(Self {
            custom_roots,
            custom,
            platform: platform.build(),
        })
    }

    /// Load extra roots from a PEM bundle
    pub fn load_pem_bundle(path: &Path) -> Result<Vec<X509>> {
        let pem = read_file(path)?;
        let certs = X509::stack_from_pem(&pem)?;
        debug!("Loaded {} trusted certificates from {}", certs.len(), path.display());
        Ok(certs)
    }

    /// Validate a chain presented by an origin server
    ///
    /// Custom store first, platform store as fallback.
    pub fn check_server_trusted(&self, chain: &[X509]) -> Result<()> {
        self.check_in_order(chain, [&self.custom, &self.platform])
    }

    /// Validate a chain presented by a client
    ///
    /// Platform store first, custom store as fallback.
    pub fn check_client_trusted(&self, chain: &[X509]) -> Result<()> {
        self.check_in_order(chain, [&self.platform, &self.custom])
    }

    /// Union of the issuers both delegates accept
    ///
    /// The platform store only contributes certificates it has loaded eagerly;
    /// directory-based lookups are resolved lazily by OpenSSL and are not listed.
    pub fn accepted_issuers(&self) -> Vec<X509> {
        let mut seen = HashSet::new();
        let mut issuers = Vec::new();

        for store in [&self.custom, &self.platform] {
            for cert in store_certificates(store) {
                if let Ok(der) = cert.to_der() {
                    if seen.insert(der) {
                        issuers.push(cert);
                    }
                }
            }
        }

        issuers
    }

    /// A fresh store holding the custom roots, for installing on a context
    pub fn custom_store(&self) -> Result<X509Store> {
        build_store(&self.custom_roots)
    }

    fn check_in_order(&self, chain: &[X509], stores: [&X509StoreRef; 2]) -> Result<()> {
        let mut last_error = String::from("empty certificate chain");

        for store in stores {
            match verify_chain(store, chain) {
                Ok(true) => return Ok(()),
                Ok(false) => last_error = "chain does not lead to a trusted root".to_string(),
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(ProxyError::TrustRejected(last_error))
    }
}

fn build_store(roots: &[X509]) -> Result<X509Store> {
    let mut builder = X509StoreBuilder::new()?;
    for root in roots {
        builder.add_cert(root.clone())?;
    }
    Ok(builder.build())
}

#[allow(deprecated)]
fn store_certificates(store: &X509StoreRef) -> Vec<X509> {
    store
        .objects()
        .iter()
        .filter_map(|object| object.x509().map(|cert| cert.to_owned()))
        .collect()
}

/// Verify `chain` (leaf first) against `store`
fn verify_chain(store: &X509StoreRef, chain: &[X509]) -> std::result::Result<bool, ErrorStack> {
    let Some((leaf, rest)) = chain.split_first() else {
        return Ok(false);
    };

    let mut untrusted = Stack::new()?;
    for cert in rest {
        untrusted.push(cert.clone())?;
    }

    let mut context = X509StoreContext::new()?;
    context.init(store, leaf, &untrusted, |ctx| ctx.verify_cert())
}

/// Owned copy of a borrowed chain
pub fn owned_chain<'a>(certs: impl IntoIterator<Item = &'a X509Ref>) -> Vec<X509> {
    certs.into_iter().map(|cert| cert.to_owned()).collect()
}
