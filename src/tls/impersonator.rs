//! Per-host impersonation cache
//!
//! Maps a requested host to a ready-to-use server context whose certificate
//! chain is `leaf + CA`. Creation is compute-once per host: concurrent misses
//! for the same host wait for a single issuance and share its result, while
//! misses for different hosts proceed in parallel. Entries idle for longer
//! than the configured timeout are replaced on their next lookup; there is no
//! background sweeper.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use once_cell::sync::OnceCell;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslContext, SslContextBuilder, SslMethod};
use openssl::x509::{X509Ref, X509};
use serde::Serialize;

use crate::ca::{create_leaf_certificate, CertificateAuthority, SubjectAltName};
use crate::common::{ProxyError, Result};
use crate::tls::policy;

/// Default idle lifetime of a cached context
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Server-role material for one impersonated host
pub struct LeafContext {
    host: String,
    certificate: X509,
    private_key: PKey<Private>,
    context: SslContext,
}

impl LeafContext {
    /// Host this context impersonates
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The minted leaf certificate
    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    /// Leaf private key
    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// Server context presenting `leaf + CA`
    pub fn context(&self) -> &SslContext {
        &self.context
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from a live entry
    pub hits: u64,
    /// Lookups that found no live entry
    pub misses: u64,
    /// Leaf certificates issued
    pub issued: u64,
    /// Entries currently held
    pub entries: usize,
}

struct CacheSlot {
    context: OnceCell<Arc<LeafContext>>,
    /// Milliseconds since the impersonator's epoch
    last_access: AtomicU64,
}

impl CacheSlot {
    fn new(now_ms: u64) -> Self {
        Self {
            context: OnceCell::new(),
            last_access: AtomicU64::new(now_ms),
        }
    }
}

/// Issues and caches impersonation contexts
pub struct Impersonator {
    ca: Arc<CertificateAuthority>,
    cache: DashMap<String, Arc<CacheSlot>>,
    idle_timeout: Duration,
    epoch: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    issued: AtomicU64,
}

impl Impersonator {
    /// Create an impersonator with the default five minute idle timeout
    pub fn new(ca: Arc<CertificateAuthority>) -> Self {
        Self::with_idle_timeout(ca, DEFAULT_IDLE_TIMEOUT)
    }

    /// Create an impersonator with a custom idle timeout
    pub fn with_idle_timeout(ca: Arc<CertificateAuthority>, idle_timeout: Duration) -> Self {
        Self {
            ca,
            cache: DashMap::new(),
            idle_timeout,
            epoch: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            issued: AtomicU64::new(0),
        }
    }

    /// The signing authority
    pub fn authority(&self) -> &Arc<CertificateAuthority> {
        &self.ca
    }

    /// Return the context for `host`, creating it at most once
    ///
    /// # Parameters
    ///
    /// * `host` - Common name to impersonate; the cache key is case-insensitive
    /// * `subject_alt_names` - SANs observed on the origin certificate
    ///
    /// # Errors
    ///
    /// Issuance failures are returned to every caller waiting on that
    /// issuance and leave the slot empty, so the next lookup retries.
    pub fn get_or_create_context(
        &self,
        host: &str,
        subject_alt_names: &[SubjectAltName],
    ) -> Result<Arc<LeafContext>> {
        let slot = self.slot(&host.to_ascii_lowercase());

        if let Some(context) = slot.context.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(context));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // The map shard is no longer locked here; only callers for this host wait
        let context = slot
            .context
            .get_or_try_init(|| self.create(host, subject_alt_names).map(Arc::new))?;

        Ok(Arc::clone(context))
    }

    /// Impersonate the origin that presented `upstream`
    ///
    /// The common name and SANs are copied from the origin certificate.
    pub fn context_for_upstream(&self, upstream: &X509Ref) -> Result<Arc<LeafContext>> {
        let common_name = upstream
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|cn| cn.to_string())
            .ok_or_else(|| ProxyError::leaf("<unknown>", "upstream certificate has no common name"))?;

        let sans = SubjectAltName::from_certificate(upstream);
        self.get_or_create_context(&common_name, &sans)
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            issued: self.issued.load(Ordering::Relaxed),
            entries: self.cache.len(),
        }
    }

    /// Find the live slot for `key`, replacing it if it has been idle too long
    fn slot(&self, key: &str) -> Arc<CacheSlot> {
        let now = self.now_ms();
        let idle_ms = self.idle_timeout.as_millis() as u64;

        match self.cache.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let last = entry.get().last_access.swap(now, Ordering::AcqRel);
                if now.saturating_sub(last) > idle_ms {
                    debug!("Impersonation context for {} expired", key);
                    entry.insert(Arc::new(CacheSlot::new(now)));
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => Arc::clone(&entry.insert(Arc::new(CacheSlot::new(now)))),
        }
    }

    fn create(&self, host: &str, subject_alt_names: &[SubjectAltName]) -> Result<LeafContext> {
        let started = Instant::now();
        let (certificate, private_key) = create_leaf_certificate(
            host,
            subject_alt_names,
            self.ca.authority(),
            self.ca.certificate(),
            self.ca.private_key(),
        )?;

        let context = self
            .server_context(&certificate, &private_key)
            .map_err(|e| ProxyError::leaf(host, e))?;

        self.issued.fetch_add(1, Ordering::Relaxed);
        info!("Impersonated {} in {:?}", host, started.elapsed());

        Ok(LeafContext {
            host: host.to_string(),
            certificate,
            private_key,
            context,
        })
    }

    fn server_context(&self, certificate: &X509, private_key: &PKey<Private>) -> Result<SslContext> {
        let mut builder = SslContextBuilder::new(SslMethod::tls_server())?;
        policy::apply(&mut builder)?;
        builder.set_certificate(certificate)?;
        builder.set_private_key(private_key)?;
        builder.add_extra_chain_cert(self.ca.certificate().to_owned())?;
        builder.check_private_key()?;
        Ok(builder.build())
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::Authority;
    use std::sync::Barrier;
    use std::thread;

    fn impersonator(idle: Duration) -> Impersonator {
        let ca = Arc::new(CertificateAuthority::create(Authority::default()).unwrap());
        Impersonator::with_idle_timeout(ca, idle)
    }

    #[test]
    fn test_concurrent_misses_create_once() {
        let imp = Arc::new(impersonator(DEFAULT_IDLE_TIMEOUT));
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let imp = Arc::clone(&imp);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    imp.get_or_create_context("concurrent.example", &[]).unwrap()
                })
            })
            .collect();

        let contexts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(imp.stats().issued, 1);
        assert!(contexts.iter().all(|c| Arc::ptr_eq(c, &contexts[0])));
    }

    #[test]
    fn test_distinct_hosts_do_not_share() {
        let imp = impersonator(DEFAULT_IDLE_TIMEOUT);
        let a = imp.get_or_create_context("a.example", &[]).unwrap();
        let b = imp.get_or_create_context("b.example", &[]).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.certificate().to_der().unwrap(), b.certificate().to_der().unwrap());
        assert_eq!(imp.stats().issued, 2);
    }

    #[test]
    fn test_host_key_is_case_insensitive() {
        let imp = impersonator(DEFAULT_IDLE_TIMEOUT);
        let a = imp.get_or_create_context("Example.COM", &[]).unwrap();
        let b = imp.get_or_create_context("example.com", &[]).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        let stats = imp.stats();
        assert_eq!((stats.hits, stats.misses, stats.issued), (1, 1, 1));
    }

    #[test]
    fn test_idle_entries_are_recreated() {
        let imp = impersonator(Duration::from_millis(10));
        let first = imp.get_or_create_context("idle.example", &[]).unwrap();
        thread::sleep(Duration::from_millis(50));
        let second = imp.get_or_create_context("idle.example", &[]).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(imp.stats().issued, 2);
        assert_eq!(imp.stats().entries, 1);
    }

    #[test]
    fn test_context_for_upstream_copies_identity() {
        let imp = impersonator(DEFAULT_IDLE_TIMEOUT);
        let origin_ca = CertificateAuthority::create(Authority::default()).unwrap();
        let sans = vec![
            SubjectAltName::Dns("origin.example".to_string()),
            SubjectAltName::Dns("www.origin.example".to_string()),
        ];
        let (origin, _) = create_leaf_certificate(
            "origin.example",
            &sans,
            origin_ca.authority(),
            origin_ca.certificate(),
            origin_ca.private_key(),
        )
        .unwrap();

        let context = imp.context_for_upstream(&origin).unwrap();
        assert_eq!(context.host(), "origin.example");
        assert_eq!(SubjectAltName::from_certificate(context.certificate()), sans);
    }
}
