//! Cipher and protocol policy applied to every TLS context
//!
//! Both roles share the same rules: two DHE-RSA/CBC suites are always
//! removed, TLS 1.2 is the protocol ceiling, and the security level is
//! lowered far enough to load 1024-bit leaf keys.

use foreign_types_shared::ForeignTypeRef;
use log::debug;
use openssl::ssl::{SslCipher, SslContextBuilder, SslRef, SslVersion};
use openssl::stack::StackRef;

use crate::common::Result;

/// IANA names of the suites that are never offered
pub const WEAK_CIPHER_SUITES: [&str; 2] = [
    "TLS_DHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_DHE_RSA_WITH_AES_256_CBC_SHA",
];

/// OpenSSL cipher string: platform defaults minus the weak suites
const CIPHER_LIST: &str = "DEFAULT:!DHE-RSA-AES128-SHA:!DHE-RSA-AES256-SHA";

/// OpenSSL security level that still accepts RSA-1024 leaf keys
const SECURITY_LEVEL: u32 = 1;

extern "C" {
    fn SSL_get_ciphers(ssl: *const openssl_sys::SSL) -> *mut openssl_sys::stack_st_SSL_CIPHER;
}

/// Apply the shared policy to a context builder
///
/// # Returns
///
/// The highest protocol version the context will negotiate.
pub fn apply(builder: &mut SslContextBuilder) -> Result<SslVersion> {
    builder.set_cipher_list(CIPHER_LIST)?;
    builder.set_security_level(SECURITY_LEVEL);
    select_protocol(builder)
}

/// Cap negotiation at TLS 1.2; every supported OpenSSL build accepts this ceiling
fn select_protocol(builder: &mut SslContextBuilder) -> Result<SslVersion> {
    builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;
    Ok(SslVersion::TLS1_2)
}

/// Names of the cipher suites enabled on an engine
///
/// IANA names where OpenSSL knows them, OpenSSL names otherwise.
pub fn enabled_cipher_suites(ssl: &SslRef) -> Vec<String> {
    // SAFETY: the stack is owned by `ssl` (or its context) and outlives the borrow
    unsafe {
        let ptr = SSL_get_ciphers(ssl.as_ptr());
        if ptr.is_null() {
            return Vec::new();
        }
        StackRef::<SslCipher>::from_ptr(ptr)
            .iter()
            .map(|cipher| cipher.standard_name().unwrap_or(cipher.name()).to_string())
            .collect()
    }
}

/// Whether any weak suite is enabled on `ssl`
pub fn has_weak_cipher(ssl: &SslRef) -> bool {
    let enabled = enabled_cipher_suites(ssl);
    let weak = enabled
        .iter()
        .any(|name| WEAK_CIPHER_SUITES.contains(&name.as_str()));
    debug!("Engine offers {} cipher suites", enabled.len());
    weak
}
