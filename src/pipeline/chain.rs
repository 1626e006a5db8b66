//! Middleware chain contract
//!
//! A chain is an ordered slice of middlewares plus a cursor. Each
//! [`Pipeline`] is a view at one cursor position; [`Pipeline::proceed`]
//! consumes the view, so a middleware can advance the chain at most once and
//! never rewind it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use log::debug;
use thiserror::Error;

use crate::common::ProxyError;
use crate::pipeline::exchange::Exchange;

/// Request as buffered by the transport
pub type HttpRequest = http::Request<Option<Bytes>>;

/// Response as handed back to the transport
pub type HttpResponse = http::Response<Option<Bytes>>;

/// Why a chain did not produce a response
#[derive(Error, Debug)]
pub enum ChainError {
    /// Every middleware proceeded and nobody answered
    ///
    /// Not a failure: the owner of the chain forwards the request untouched.
    #[error("End of middleware chain")]
    EndOfChain,

    /// A middleware failed; the current exchange fails with it
    #[error(transparent)]
    Failed(#[from] ProxyError),
}

/// Which leg of the exchange a chain runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to origin, before the request leaves the proxy
    Outbound,
    /// Origin to client, once a response exists
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => f.write_str("outbound"),
            Direction::Inbound => f.write_str("inbound"),
        }
    }
}

/// An interceptor in a chain
///
/// Either answer directly (short-circuit) or call [`Pipeline::proceed`] and
/// return, possibly after inspecting, what the rest of the chain produced.
pub trait Middleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn handle(&self, pipeline: Pipeline<'_>) -> Result<HttpResponse, ChainError>;
}

/// A view of a chain at one position
pub struct Pipeline<'a> {
    request: &'a HttpRequest,
    exchange: &'a Exchange,
    direction: Direction,
    middlewares: &'a [Arc<dyn Middleware>],
    index: usize,
}

impl<'a> Pipeline<'a> {
    /// A view positioned before the first middleware
    pub fn new(
        request: &'a HttpRequest,
        exchange: &'a Exchange,
        direction: Direction,
        middlewares: &'a [Arc<dyn Middleware>],
    ) -> Self {
        Self {
            request,
            exchange,
            direction,
            middlewares,
            index: 0,
        }
    }

    /// The in-flight request
    pub fn request(&self) -> &'a HttpRequest {
        self.request
    }

    /// State derived from the request when the exchange started
    pub fn exchange(&self) -> &'a Exchange {
        self.exchange
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Run the next middleware with a view advanced by one
    ///
    /// # Errors
    ///
    /// [`ChainError::EndOfChain`] when there is no next middleware, or
    /// whatever the rest of the chain failed with.
    pub fn proceed(self) -> Result<HttpResponse, ChainError> {
        let middleware = self.middlewares.get(self.index).ok_or(ChainError::EndOfChain)?;

        debug!(
            "{} [{}] {} {}",
            self.direction,
            self.index,
            middleware.name(),
            self.request.uri()
        );

        middleware.handle(Pipeline {
            index: self.index + 1,
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::exchange::Exchange;
    use http::{Request, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl Middleware for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn handle(&self, pipeline: Pipeline<'_>) -> Result<HttpResponse, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            pipeline.proceed()
        }
    }

    struct Answer(u16);

    impl Middleware for Answer {
        fn name(&self) -> &str {
            "answer"
        }

        fn handle(&self, _pipeline: Pipeline<'_>) -> Result<HttpResponse, ChainError> {
            Ok(Response::builder().status(self.0).body(None).unwrap())
        }
    }

    fn request() -> HttpRequest {
        Request::builder().uri("http://a.example/").body(None).unwrap()
    }

    #[test]
    fn test_end_of_chain() {
        let request = request();
        let exchange = Exchange::new(&request, false);
        let calls = Arc::new(AtomicUsize::new(0));
        let middlewares: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder { name: "a", calls: Arc::clone(&calls) }),
            Arc::new(Recorder { name: "b", calls: Arc::clone(&calls) }),
        ];

        let result = Pipeline::new(&request, &exchange, Direction::Outbound, &middlewares).proceed();

        assert!(matches!(result, Err(ChainError::EndOfChain)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_short_circuit_skips_rest() {
        let request = request();
        let exchange = Exchange::new(&request, false);
        let calls = Arc::new(AtomicUsize::new(0));
        let middlewares: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Answer(418)),
            Arc::new(Recorder { name: "never", calls: Arc::clone(&calls) }),
        ];

        let response = Pipeline::new(&request, &exchange, Direction::Inbound, &middlewares)
            .proceed()
            .unwrap();

        assert_eq!(response.status(), 418);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_chain() {
        let request = request();
        let exchange = Exchange::new(&request, true);
        let result = Pipeline::new(&request, &exchange, Direction::Outbound, &[]).proceed();
        assert!(matches!(result, Err(ChainError::EndOfChain)));
    }
}
