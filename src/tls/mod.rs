//! TLS module
//!
//! Engine factory, impersonation cache, merged trust policy and the cipher
//! and protocol rules shared by every context.

pub mod factory;
pub mod impersonator;
pub mod policy;
pub mod trust;

pub use factory::{ClientTrustOptions, TlsEngineFactory};
pub use impersonator::{CacheStats, Impersonator, LeafContext, DEFAULT_IDLE_TIMEOUT};
pub use policy::{enabled_cipher_suites, WEAK_CIPHER_SUITES};
pub use trust::MergedTrust;
