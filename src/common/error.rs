//! Error handling module
//!
//! This module defines the error types and result type aliases used across the
//! certificate authority, the TLS engine factory, the interception pipeline and
//! the capture stores.

use thiserror::Error;
use std::io;

/// MITM proxy error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid regular expression in a pattern or filter
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// The root CA could not be created or loaded. Fatal at startup.
    #[error("Root certificate error: {0}")]
    RootCertificate(String),

    /// A per-host leaf certificate could not be minted
    #[error("Failed to create leaf certificate for {host}: {reason}")]
    LeafCertificate {
        /// Host the certificate was requested for
        host: String,
        /// Underlying cause
        reason: String,
    },

    /// A freshly signed certificate failed its own signature or validity check
    #[error("Issued certificate failed self-check: {0}")]
    IssuedCertificateInvalid(String),

    /// Neither trust delegate accepted a certificate chain
    #[error("Certificate chain rejected: {0}")]
    TrustRejected(String),

    /// Upstream call failed
    #[error("Forwarding failed: {0}")]
    Forward(String),

    /// Invalid mapping rule
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl ProxyError {
    /// Wrap any displayable cause as a leaf certificate failure for `host`
    pub fn leaf(host: &str, reason: impl std::fmt::Display) -> Self {
        ProxyError::LeafCertificate {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let proxy_err: ProxyError = io_err.into();

        match proxy_err {
            ProxyError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }
    }

    #[test]
    fn test_regex_error_conversion() {
        let err = regex::Regex::new("(unclosed").unwrap_err();
        let proxy_err: ProxyError = err.into();
        assert!(matches!(proxy_err, ProxyError::Regex(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::leaf("example.com", "key generation failed");
        let err_str = format!("{}", err);
        assert!(err_str.contains("example.com"));
        assert!(err_str.contains("key generation failed"));

        let err = ProxyError::Config("Invalid configuration".to_string());
        assert!(err.to_string().contains("Invalid configuration"));
    }
}
