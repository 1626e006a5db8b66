//! Per-exchange state
//!
//! Everything the middlewares derive from the request (scheme, host, path,
//! query, timing) is computed once, when the request first reaches the
//! proxy.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use http::header::HOST;

use crate::common::{BufferPermit, BufferPool};
use crate::mapping::Location;
use crate::pipeline::chain::HttpRequest;

/// State shared by the outbound and inbound legs of one exchange
#[derive(Debug)]
pub struct Exchange {
    location: Location,
    started: Instant,
    started_at: DateTime<Utc>,
    budget: BufferPool,
    /// Held while the request body is kept for capture
    request_buffer: Option<BufferPermit>,
}

impl Exchange {
    /// Exchange with an unbounded capture budget
    pub fn new(request: &HttpRequest, tls: bool) -> Self {
        Self::with_budget(request, tls, &BufferPool::new(usize::MAX))
    }

    /// Exchange whose captured bodies draw from `budget`
    ///
    /// The request body is reserved right away. When the budget cannot cover
    /// it, the flow records a size placeholder instead of the body.
    pub fn with_budget(request: &HttpRequest, tls: bool, budget: &BufferPool) -> Self {
        let uri = request.uri();
        let host = request
            .headers()
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|authority| authority.as_str().to_string()));

        let location = Location {
            scheme: if tls { "https" } else { "http" }.to_string(),
            host,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
        };

        let body_len = request.body().as_ref().map_or(0, |body| body.len());

        Self {
            location,
            started: Instant::now(),
            started_at: Utc::now(),
            budget: budget.clone(),
            request_buffer: budget.try_reserve(body_len),
        }
    }

    /// Where the client sent the request
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// `https` when the client connection is TLS, else `http`
    pub fn scheme(&self) -> &str {
        &self.location.scheme
    }

    /// Host header, or the URI authority when there is none
    pub fn host(&self) -> Option<&str> {
        self.location.host.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.location.path
    }

    pub fn query(&self) -> Option<&str> {
        self.location.query.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the request body fit into the capture budget
    pub fn request_body_held(&self) -> bool {
        self.request_buffer.is_some()
    }

    /// Reserve room for another captured body
    pub fn reserve(&self, len: usize) -> Option<BufferPermit> {
        self.budget.try_reserve(len)
    }
}
