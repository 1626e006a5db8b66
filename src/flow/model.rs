//! Captured flow records

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::header::CONTENT_LENGTH;
use http::HeaderMap;
use serde::{Serialize, Serializer};
use url::Url;

use crate::flow::body::FlowBody;

/// One completed request/response exchange
///
/// Immutable once appended to the store.
#[derive(Debug, Clone, Serialize)]
pub struct Flow {
    pub id: u64,
    /// Wall-clock time the exchange took, serialized in milliseconds
    #[serde(serialize_with = "millis")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub request: FlowRequest,
    pub response: FlowResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowRequest {
    pub method: String,
    /// Absolute URL as the client addressed it
    pub url: Url,
    /// Original Host header, or the URL host when there was none
    pub host: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<FlowBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<FlowBody>,
}

/// List entry returned by the flow query surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSummary {
    pub id: u64,
    pub protocol: String,
    pub method: String,
    pub host: String,
    pub path: String,
    pub status: u16,
    /// Response Content-Length, when declared
    pub size: Option<u64>,
    /// Milliseconds
    pub duration: u64,
}

impl Flow {
    /// URL scheme the client used
    pub fn protocol(&self) -> &str {
        self.request.url.scheme()
    }

    /// Host the client addressed
    pub fn host(&self) -> &str {
        &self.request.host
    }

    /// Request path, without the query
    pub fn path(&self) -> &str {
        self.request.url.path()
    }

    pub fn summary(&self) -> FlowSummary {
        FlowSummary {
            id: self.id,
            protocol: self.protocol().to_string(),
            method: self.request.method.clone(),
            host: self.host().to_string(),
            path: self.path().to_string(),
            status: self.response.status,
            size: self
                .response
                .headers
                .get(CONTENT_LENGTH.as_str())
                .and_then(|len| len.trim().parse().ok()),
            duration: self.duration.as_millis() as u64,
        }
    }
}

/// Collapse a header map into `name -> "v1, v2"`
///
/// Values that are not valid visible ASCII are decoded lossily.
pub fn joined_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut joined: BTreeMap<String, String> = BTreeMap::new();

    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        joined
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }

    joined
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
