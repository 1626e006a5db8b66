//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Request, Response};
use mitm_proxy::ca::Authority;
use mitm_proxy::config::ProxyConfig;
use mitm_proxy::{CertificateAuthority, MitmManager, Result, UpstreamClient};

/// Upstream that answers every call with a canned response and remembers
/// what it was asked
pub struct RecordingUpstream {
    response: Response<Option<Bytes>>,
    pub seen: Mutex<Vec<Request<Option<Bytes>>>>,
}

impl RecordingUpstream {
    pub fn new(response: Response<Option<Bytes>>) -> Self {
        Self {
            response,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl UpstreamClient for RecordingUpstream {
    fn execute(&self, request: Request<Option<Bytes>>) -> Result<Response<Option<Bytes>>> {
        self.seen.lock().unwrap().push(request);

        let mut response = Response::builder().status(self.response.status());
        for (name, value) in self.response.headers() {
            response = response.header(name, value);
        }
        Ok(response.body(self.response.body().clone()).unwrap())
    }
}

pub fn authority() -> Arc<CertificateAuthority> {
    Arc::new(CertificateAuthority::create(Authority::default()).unwrap())
}

/// Manager built from a JSON configuration
pub fn manager(config_json: &str, upstream: Arc<RecordingUpstream>) -> MitmManager {
    let config: ProxyConfig = serde_json::from_str(config_json).unwrap();
    MitmManager::new(authority(), &config, upstream).unwrap()
}
