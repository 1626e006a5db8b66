//! Outbound mapping middlewares

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST};
use http::{Request, Response, StatusCode, Uri};
use log::{debug, info};
use url::Url;

use crate::common::{split_authority, ProxyError, Result};
use crate::mapping::{MappingRegistry, RemoteTarget};
use crate::pipeline::chain::{ChainError, HttpRequest, HttpResponse, Middleware, Pipeline};
use crate::pipeline::exchange::Exchange;
use crate::upstream::UpstreamClient;

/// Answers matching requests with local stub content
pub struct MapToLocal {
    mappings: Arc<MappingRegistry>,
}

impl MapToLocal {
    pub fn new(mappings: Arc<MappingRegistry>) -> Self {
        Self { mappings }
    }
}

impl Middleware for MapToLocal {
    fn name(&self) -> &str {
        "map-to-local"
    }

    fn handle(&self, pipeline: Pipeline<'_>) -> std::result::Result<HttpResponse, ChainError> {
        match self.mappings.find_local(pipeline.exchange().location()) {
            Some(content) => {
                debug!("Serving {} from local mapping", pipeline.request().uri());
                Ok(local_response(content)?)
            }
            None => pipeline.proceed(),
        }
    }
}

fn local_response(content: Bytes) -> Result<HttpResponse> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_LENGTH, content.len())
        .body(Some(content))
        .map_err(|e| ProxyError::Mapping(format!("Invalid local response: {}", e)))
}

/// Forwards matching requests to an overridden destination
pub struct MapToRemote {
    mappings: Arc<MappingRegistry>,
    upstream: Arc<dyn UpstreamClient>,
}

impl MapToRemote {
    pub fn new(mappings: Arc<MappingRegistry>, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { mappings, upstream }
    }
}

impl Middleware for MapToRemote {
    fn name(&self) -> &str {
        "map-to-remote"
    }

    fn handle(&self, pipeline: Pipeline<'_>) -> std::result::Result<HttpResponse, ChainError> {
        let exchange = pipeline.exchange();
        let target = match self.mappings.find_remote(exchange.location()) {
            Some(target) => target,
            None => return pipeline.proceed(),
        };

        let url = remote_url(exchange, &target)?;
        info!("Remapping {} to {}", pipeline.request().uri(), url);

        let request = remote_request(pipeline.request(), &url)?;
        Ok(self.upstream.execute(request)?)
    }
}

/// Resolve the effective destination of a remapped request
///
/// Unset target fields fall back to the original request. The port is taken
/// from the target host (or the original Host header) when it is in
/// `1..=65535`.
pub fn remote_url(exchange: &Exchange, target: &RemoteTarget) -> Result<Url> {
    let scheme = target.scheme.as_deref().unwrap_or("http");
    let authority = target
        .host
        .as_deref()
        .or_else(|| exchange.host())
        .ok_or_else(|| ProxyError::Forward("Remapped request has no host".to_string()))?;
    let (host, port) = split_authority(authority);

    let host = if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };

    let invalid = |e: url::ParseError| ProxyError::Forward(format!("Invalid remote target {}: {}", authority, e));

    let mut url = Url::parse(&format!("{}://{}/", scheme, host)).map_err(invalid)?;
    if url.set_port(port).is_err() {
        return Err(ProxyError::Forward(format!("Scheme {} cannot carry a port", scheme)));
    }

    url.set_path(target.path.as_deref().unwrap_or_else(|| exchange.path()));
    match target.query.as_deref().or_else(|| exchange.query()) {
        Some(query) if !query.is_empty() => url.set_query(Some(query)),
        _ => url.set_query(None),
    }

    Ok(url)
}

fn remote_request(original: &HttpRequest, url: &Url) -> Result<HttpRequest> {
    let uri: Uri = url
        .as_str()
        .parse()
        .map_err(|e| ProxyError::Forward(format!("Invalid remote URI {}: {}", url, e)))?;

    let mut builder = Request::builder()
        .method(original.method().clone())
        .uri(uri);

    for (name, value) in original.headers() {
        if name != HOST {
            builder = builder.header(name, value);
        }
    }
    if let Some(host) = url.host_str() {
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        builder = builder.header(HOST, host);
    }

    builder
        .body(original.body().clone())
        .map_err(|e| ProxyError::Forward(format!("Invalid remote request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::LocationPattern;
    use crate::pipeline::chain::Direction;
    use crate::upstream::MockUpstreamClient;

    fn request(uri: &str, host: &str) -> HttpRequest {
        Request::builder()
            .uri(uri)
            .header(HOST, host)
            .body(None)
            .unwrap()
    }

    fn run(middlewares: &[Arc<dyn Middleware>], request: &HttpRequest) -> std::result::Result<HttpResponse, ChainError> {
        let exchange = Exchange::new(request, false);
        Pipeline::new(request, &exchange, Direction::Outbound, middlewares).proceed()
    }

    #[test]
    fn test_local_mapping_short_circuits() {
        let mappings = Arc::new(MappingRegistry::new());
        mappings.map_to_local(LocationPattern::builder().path("^/ping$").build().unwrap(), "pong");

        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(MapToLocal::new(mappings))];

        let response = run(&middlewares, &request("/ping", "a.example")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "4");
        assert_eq!(response.body().as_deref(), Some(&b"pong"[..]));

        let miss = run(&middlewares, &request("/pong", "a.example"));
        assert!(matches!(miss, Err(ChainError::EndOfChain)));
    }

    #[test]
    fn test_remote_url_keeps_original_path_and_query() {
        let original = request("/api?x=1", "old.example");
        let exchange = Exchange::new(&original, false);

        let url = remote_url(&exchange, &RemoteTarget::host("new.example")).unwrap();
        assert_eq!(url.as_str(), "http://new.example/api?x=1");
    }

    #[test]
    fn test_remote_url_overrides() {
        let original = request("/api?x=1", "old.example:8080");
        let exchange = Exchange::new(&original, true);

        let keeps_port = remote_url(&exchange, &RemoteTarget::default()).unwrap();
        assert_eq!(keeps_port.as_str(), "http://old.example:8080/api?x=1");

        let target = RemoteTarget {
            scheme: Some("https".to_string()),
            host: Some("new.example:9443".to_string()),
            path: Some("/v2/api".to_string()),
            query: Some("y=2".to_string()),
        };
        let url = remote_url(&exchange, &target).unwrap();
        assert_eq!(url.as_str(), "https://new.example:9443/v2/api?y=2");
    }

    #[test]
    fn test_remote_url_ignores_port_zero() {
        let original = request("/", "old.example");
        let exchange = Exchange::new(&original, false);
        let url = remote_url(&exchange, &RemoteTarget::host("new.example:0")).unwrap();
        assert_eq!(url.as_str(), "http://new.example/");
    }

    #[test]
    fn test_remote_mapping_forwards() {
        let mappings = Arc::new(MappingRegistry::new());
        mappings.map_to_remote(
            LocationPattern::builder().host(r"^old\.example$").build().unwrap(),
            RemoteTarget::host("new.example"),
        );

        let mut upstream = MockUpstreamClient::new();
        upstream
            .expect_execute()
            .withf(|request| {
                request.uri() == "http://new.example/api?x=1" && request.headers()[HOST] == "new.example"
            })
            .times(1)
            .returning(|_| Ok(Response::builder().status(201).body(Some(Bytes::from_static(b"ok"))).unwrap()));

        let middlewares: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(MapToRemote::new(mappings, Arc::new(upstream)))];

        let response = run(&middlewares, &request("/api?x=1", "old.example")).unwrap();
        assert_eq!(response.status(), 201);
    }

    #[test]
    fn test_forward_failure_is_chain_failure() {
        let mappings = Arc::new(MappingRegistry::new());
        mappings.map_to_remote(
            LocationPattern::builder().path("/.*").build().unwrap(),
            RemoteTarget::host("down.example"),
        );

        let mut upstream = MockUpstreamClient::new();
        upstream
            .expect_execute()
            .times(1)
            .returning(|_| Err(ProxyError::Forward("connection refused".to_string())));

        let middlewares: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(MapToRemote::new(mappings, Arc::new(upstream)))];

        let result = run(&middlewares, &request("/x", "a.example"));
        assert!(matches!(result, Err(ChainError::Failed(ProxyError::Forward(_)))));
    }
}
