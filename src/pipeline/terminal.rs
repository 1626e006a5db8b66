//! Last stage of the inbound chain

use std::sync::{Mutex, PoisonError};

use crate::common::ProxyError;
use crate::pipeline::chain::{ChainError, HttpResponse, Middleware, Pipeline};

/// Hands back the response that was already obtained
///
/// Built per exchange. The response can be taken once.
pub struct Terminal {
    response: Mutex<Option<HttpResponse>>,
}

impl Terminal {
    pub fn new(response: HttpResponse) -> Self {
        Self {
            response: Mutex::new(Some(response)),
        }
    }
}

impl Middleware for Terminal {
    fn name(&self) -> &str {
        "terminal"
    }

    fn handle(&self, _pipeline: Pipeline<'_>) -> Result<HttpResponse, ChainError> {
        self.response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| ChainError::Failed(ProxyError::Other("Response already consumed".to_string())))
    }
}
