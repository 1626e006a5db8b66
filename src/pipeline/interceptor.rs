//! Per-exchange interceptor
//!
//! The transport creates one [`Interceptor`] per request/response cycle and
//! calls it at two points:
//!
//! 1. [`Interceptor::outbound`] when the request is about to leave the proxy.
//!    `Ok(Some(response))` means a middleware answered and the request must
//!    not be sent; `Ok(None)` means nothing intercepted it.
//! 2. [`Interceptor::inbound`] once a response exists, whether it came from
//!    the origin or from step 1. The returned response goes to the client.
//!
//! `inbound` consumes the interceptor, so the buffered request and its
//! capture reservation are released on every path out of it.

use std::sync::Arc;

use http::Method;
use log::{debug, error};

use crate::common::{BufferPool, ProxyError, Result};
use crate::flow::FlowStore;
use crate::mapping::MappingRegistry;
use crate::pipeline::capture::{FlowCapture, Instrumentation};
use crate::pipeline::chain::{ChainError, Direction, HttpRequest, HttpResponse, Middleware, Pipeline};
use crate::pipeline::exchange::Exchange;
use crate::pipeline::mapping::{MapToLocal, MapToRemote};
use crate::pipeline::terminal::Terminal;
use crate::upstream::UpstreamClient;

/// Shared collaborators every interceptor is built from
///
/// Constructed once per proxy instance.
pub struct ProxyContext {
    pub mappings: Arc<MappingRegistry>,
    pub flows: Arc<FlowStore>,
    pub upstream: Arc<dyn UpstreamClient>,
    /// Byte budget for bodies held for capture
    pub buffers: BufferPool,
    /// Run first on both legs
    pub bootstrap: Vec<Arc<dyn Middleware>>,
}

impl ProxyContext {
    /// Context with an unbounded capture budget and no bootstrap middlewares
    pub fn new(
        mappings: Arc<MappingRegistry>,
        flows: Arc<FlowStore>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self {
            mappings,
            flows,
            upstream,
            buffers: BufferPool::new(usize::MAX),
            bootstrap: Vec::new(),
        }
    }

    pub fn with_buffers(mut self, buffers: BufferPool) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: Vec<Arc<dyn Middleware>>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    fn outbound_chain(&self) -> Vec<Arc<dyn Middleware>> {
        let mut chain = self.bootstrap.clone();
        chain.push(Arc::new(MapToLocal::new(Arc::clone(&self.mappings))));
        chain.push(Arc::new(MapToRemote::new(
            Arc::clone(&self.mappings),
            Arc::clone(&self.upstream),
        )));
        chain
    }

    fn inbound_chain(&self, response: HttpResponse) -> Vec<Arc<dyn Middleware>> {
        let mut chain = self.bootstrap.clone();
        chain.push(Arc::new(Instrumentation));
        chain.push(Arc::new(FlowCapture::new(Arc::clone(&self.flows))));
        chain.push(Arc::new(Terminal::new(response)));
        chain
    }
}

/// Interception state for one request/response cycle
pub struct Interceptor {
    context: Arc<ProxyContext>,
    request: HttpRequest,
    exchange: Exchange,
}

impl Interceptor {
    /// Take ownership of a buffered request
    ///
    /// # Parameters
    ///
    /// * `context` - Shared collaborators
    /// * `request` - The request as received from the client
    /// * `tls` - Whether the client connection is TLS
    pub fn new(context: Arc<ProxyContext>, request: HttpRequest, tls: bool) -> Self {
        let exchange = Exchange::with_budget(&request, tls, &context.buffers);
        Self {
            context,
            request,
            exchange,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// CONNECT only sets up a tunnel; nothing to intercept
    fn is_tunnel(&self) -> bool {
        self.request.method() == Method::CONNECT
    }

    /// Run the outbound chain
    ///
    /// # Returns
    ///
    /// `Some(response)` when a middleware answered in place of the origin,
    /// `None` when the request should be forwarded as is.
    ///
    /// # Errors
    ///
    /// Whatever a middleware failed with, e.g. [`ProxyError::Forward`] from a
    /// remapped call.
    pub fn outbound(&self) -> Result<Option<HttpResponse>> {
        if self.is_tunnel() {
            return Ok(None);
        }

        let chain = self.context.outbound_chain();
        match Pipeline::new(&self.request, &self.exchange, Direction::Outbound, &chain).proceed() {
            Ok(response) => Ok(Some(response)),
            Err(ChainError::EndOfChain) => {
                debug!("Nothing intercepted {} {}", self.request.method(), self.request.uri());
                Ok(None)
            }
            Err(ChainError::Failed(e)) => {
                error!("Outbound chain failed for {}: {}", self.request.uri(), e);
                Err(e)
            }
        }
    }

    /// Run the inbound chain and hand back the response for the client
    pub fn inbound(self, response: HttpResponse) -> Result<HttpResponse> {
        if self.is_tunnel() {
            return Ok(response);
        }

        let chain = self.context.inbound_chain(response);
        match Pipeline::new(&self.request, &self.exchange, Direction::Inbound, &chain).proceed() {
            Ok(response) => Ok(response),
            Err(ChainError::Failed(e)) => {
                error!("Inbound chain failed for {}: {}", self.request.uri(), e);
                Err(e)
            }
            // A bootstrap middleware cannot get past the terminal stage
            Err(ChainError::EndOfChain) => Err(ProxyError::Other(
                "Inbound chain ended without a response".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowFilter;
    use crate::mapping::{LocationPattern, RemoteTarget};
    use crate::upstream::MockUpstreamClient;
    use bytes::Bytes;
    use http::header::HOST;
    use http::{Request, Response};

    fn context(upstream: MockUpstreamClient) -> Arc<ProxyContext> {
        Arc::new(ProxyContext::new(
            Arc::new(MappingRegistry::new()),
            Arc::new(FlowStore::new()),
            Arc::new(upstream),
        ))
    }

    fn get(uri: &str, host: &str) -> HttpRequest {
        Request::builder().uri(uri).header(HOST, host).body(None).unwrap()
    }

    #[test]
    fn test_local_wins_over_remote() {
        let mut upstream = MockUpstreamClient::new();
        upstream.expect_execute().times(0);
        let context = context(upstream);

        let everything = LocationPattern::builder().path("/.*").build().unwrap();
        context.mappings.map_to_remote(everything.clone(), RemoteTarget::host("new.example"));
        context.mappings.map_to_local(everything, "stub");

        let interceptor = Interceptor::new(Arc::clone(&context), get("/x", "a.example"), false);
        let response = interceptor.outbound().unwrap().unwrap();
        assert_eq!(response.body().as_deref(), Some(&b"stub"[..]));

        let response = interceptor.inbound(response).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(context.flows.len(), 1);
    }

    #[test]
    fn test_no_interception_then_capture() {
        let context = context(MockUpstreamClient::new());

        let interceptor = Interceptor::new(Arc::clone(&context), get("/plain?q=1", "origin.example"), true);
        assert!(interceptor.outbound().unwrap().is_none());

        let origin = Response::builder()
            .status(404)
            .body(Some(Bytes::from_static(b"missing")))
            .unwrap();
        let response = interceptor.inbound(origin).unwrap();
        assert_eq!(response.status(), 404);

        let flows = context.flows.list(&FlowFilter::default());
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].request.url.as_str(), "https://origin.example/plain?q=1");
        assert_eq!(flows[0].response.status, 404);
    }

    #[test]
    fn test_connect_is_not_intercepted() {
        let context = context(MockUpstreamClient::new());
        context
            .mappings
            .map_to_local(LocationPattern::builder().host(".*").build().unwrap(), "stub");

        let request = Request::builder()
            .method(Method::CONNECT)
            .uri("secure.example:443")
            .body(None)
            .unwrap();
        let interceptor = Interceptor::new(Arc::clone(&context), request, false);
        assert!(interceptor.outbound().unwrap().is_none());

        interceptor.inbound(Response::new(None)).unwrap();
        assert!(context.flows.is_empty());
    }

    #[test]
    fn test_forward_failure_surfaces() {
        let mut upstream = MockUpstreamClient::new();
        upstream
            .expect_execute()
            .returning(|_| Err(ProxyError::Forward("timed out".to_string())));
        let context = context(upstream);
        context.mappings.map_to_remote(
            LocationPattern::builder().host("a\\.example").build().unwrap(),
            RemoteTarget::host("b.example"),
        );

        let interceptor = Interceptor::new(context, get("/", "a.example"), false);
        assert!(matches!(interceptor.outbound(), Err(ProxyError::Forward(_))));
    }

    struct Tag;

    impl Middleware for Tag {
        fn name(&self) -> &str {
            "tag"
        }

        fn handle(&self, pipeline: Pipeline<'_>) -> std::result::Result<HttpResponse, ChainError> {
            let direction = pipeline.direction();
            let mut response = pipeline.proceed()?;
            if direction == Direction::Inbound {
                response
                    .headers_mut()
                    .insert("x-intercepted", http::HeaderValue::from_static("1"));
            }
            Ok(response)
        }
    }

    #[test]
    fn test_bootstrap_runs_first() {
        let context = Arc::new(
            ProxyContext::new(
                Arc::new(MappingRegistry::new()),
                Arc::new(FlowStore::new()),
                Arc::new(MockUpstreamClient::new()),
            )
            .with_bootstrap(vec![Arc::new(Tag)]),
        );

        let interceptor = Interceptor::new(context, get("/", "a.example"), false);
        assert!(interceptor.outbound().unwrap().is_none());
        let response = interceptor.inbound(Response::new(None)).unwrap();
        assert_eq!(response.headers()["x-intercepted"], "1");
    }
}
