//! Upstream HTTP client
//!
//! The interception pipeline forwards remapped requests through an
//! [`UpstreamClient`]. The default [`HttpUpstream`] is a blocking `reqwest`
//! client: a forward call occupies the calling thread until the origin
//! answers or the configured timeouts fire.
//!
//! `HttpUpstream` must be created and dropped outside of an async runtime.
//!
//! Origin trust here is reqwest's, not [`MergedTrust`](crate::tls::MergedTrust):
//! the platform roots plus every PEM in `extra_roots` (the proxy CA and the
//! configured trust store, see [`trusted_roots`](crate::manager::trusted_roots)),
//! or any certificate at all when `trust_all_servers` is set. `MergedTrust`
//! only governs the client engines handed out by the TLS engine factory.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, CONTENT_LENGTH, HOST};
use http::{HeaderValue, Method, Request, Response};
use log::{debug, error};
use openssl::x509::X509;

use crate::common::{ProxyError, Result};

/// Headers scoped to a single connection, never forwarded
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether `name` must be dropped when relaying a message
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Synchronous `execute(request) -> response` contract
///
/// Any failure to obtain a response is a [`ProxyError::Forward`]. Calls are
/// never retried.
#[cfg_attr(test, mockall::automock)]
pub trait UpstreamClient: Send + Sync {
    fn execute(&self, request: Request<Option<Bytes>>) -> Result<Response<Option<Bytes>>>;
}

/// Settings handed to [`HttpUpstream`]
#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Accept any origin certificate
    pub trust_all_servers: bool,
    /// Trusted on top of the platform roots
    pub extra_roots: Vec<X509>,
}

impl Default for UpstreamOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            trust_all_servers: false,
            extra_roots: Vec::new(),
        }
    }
}

/// `reqwest` backed [`UpstreamClient`]
pub struct HttpUpstream {
    client: reqwest::blocking::Client,
}

impl HttpUpstream {
    /// Build the client
    ///
    /// Redirects are returned to the caller instead of being followed.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Forward`] when the TLS backend rejects a root or
    /// the client cannot be built.
    pub fn new(options: &UpstreamOptions) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.read_timeout + options.write_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(options.trust_all_servers);

        for root in &options.extra_roots {
            let certificate = reqwest::Certificate::from_pem(&root.to_pem()?)
                .map_err(|e| ProxyError::Forward(format!("Invalid trust root: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder
            .build()
            .map_err(|e| ProxyError::Forward(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl UpstreamClient for HttpUpstream {
    fn execute(&self, request: Request<Option<Bytes>>) -> Result<Response<Option<Bytes>>> {
        let (parts, body) = request.into_parts();
        let url = parts.uri.to_string();

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .map_err(|e| ProxyError::Forward(format!("Invalid HTTP method: {}", e)))?;
        let mut outgoing = self.client.request(method, url.as_str());

        for (name, value) in &parts.headers {
            if is_hop_by_hop(name.as_str()) || name == HOST || name == CONTENT_LENGTH {
                continue;
            }
            outgoing = outgoing.header(name.as_str(), value.as_bytes());
        }

        if let Some(body) = body.filter(|_| carries_body(&parts.method)) {
            outgoing = outgoing.body(body.to_vec());
        }

        debug!("Forwarding {} {}", parts.method, url);
        let incoming = outgoing.send().map_err(|e| {
            error!("Failed to forward {} {}: {}", parts.method, url, e);
            ProxyError::Forward(format!("{} {}: {}", parts.method, url, e))
        })?;

        let status = incoming.status().as_u16();
        let mut builder = Response::builder().status(status);
        for (name, value) in incoming.headers() {
            if is_hop_by_hop(name.as_str()) || name.as_str().eq_ignore_ascii_case("content-length") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                builder = builder.header(name, value);
            }
        }

        let body = incoming
            .bytes()
            .map_err(|e| ProxyError::Forward(format!("Failed to read response from {}: {}", url, e)))?;

        builder
            .header(CONTENT_LENGTH, body.len())
            .body(Some(body))
            .map_err(|e| ProxyError::Forward(format!("Invalid response from {}: {}", url, e)))
    }
}

fn carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn test_carries_body() {
        assert!(carries_body(&Method::POST));
        assert!(carries_body(&Method::PUT));
        assert!(!carries_body(&Method::GET));
        assert!(!carries_body(&Method::HEAD));
    }

    #[test]
    fn test_mock_client() {
        let mut upstream = MockUpstreamClient::new();
        upstream
            .expect_execute()
            .times(1)
            .returning(|_| Ok(Response::builder().status(204).body(None).unwrap()));

        let request = Request::builder()
            .uri("http://a.example/")
            .body(None)
            .unwrap();
        let response = upstream.execute(request).unwrap();
        assert_eq!(response.status(), 204);
    }
}
