//! Inbound observation middlewares: metrics and flow capture

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::HeaderMap;
use log::{debug, error, warn};
use metrics::{counter, histogram};
use url::Url;

use crate::common::{ProxyError, Result};
use crate::flow::{decode_body, joined_headers, Flow, FlowBody, FlowRequest, FlowResponse, FlowStore};
use crate::pipeline::chain::{ChainError, HttpRequest, HttpResponse, Middleware, Pipeline};
use crate::pipeline::exchange::Exchange;

/// Records request counts and message sizes through the `metrics` facade
pub struct Instrumentation;

impl Middleware for Instrumentation {
    fn name(&self) -> &str {
        "instrumentation"
    }

    fn handle(&self, pipeline: Pipeline<'_>) -> std::result::Result<HttpResponse, ChainError> {
        let request = pipeline.request();
        let exchange = pipeline.exchange();
        let response = pipeline.proceed()?;

        let host = exchange.host().unwrap_or_default().to_string();
        let method = request.method().as_str().to_string();
        let path = exchange.path().to_string();
        let uri = match exchange.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path.clone(),
        };

        counter!(
            "mitmproxy.requests",
            "host" => host.clone(),
            "method" => method.clone(),
            "uri" => uri.clone()
        )
        .increment(1);

        histogram!(
            "mitmproxy.request.size",
            "host" => host.clone(),
            "path" => path.clone(),
            "method" => method.clone(),
            "uri" => uri.clone()
        )
        .record(message_size(request.headers(), request.body().as_ref()) as f64);

        histogram!(
            "mitmproxy.response.size",
            "host" => host,
            "path" => path,
            "method" => method,
            "uri" => uri,
            "status" => response.status().as_u16().to_string()
        )
        .record(message_size(response.headers(), response.body().as_ref()) as f64);

        Ok(response)
    }
}

/// Buffered length, else the declared Content-Length, else 0
fn message_size(headers: &HeaderMap, body: Option<&Bytes>) -> u64 {
    match body {
        Some(body) => body.len() as u64,
        None => headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0),
    }
}

/// Appends one [`Flow`] per completed exchange to the store
pub struct FlowCapture {
    flows: Arc<FlowStore>,
}

impl FlowCapture {
    pub fn new(flows: Arc<FlowStore>) -> Self {
        Self { flows }
    }
}

impl Middleware for FlowCapture {
    fn name(&self) -> &str {
        "flow-capture"
    }

    fn handle(&self, pipeline: Pipeline<'_>) -> std::result::Result<HttpResponse, ChainError> {
        let id = self.flows.next_id();
        let request = pipeline.request();
        let exchange = pipeline.exchange();
        let response = pipeline.proceed()?;

        self.record(id, capture(id, request, exchange, &response));
        Ok(response)
    }
}

impl FlowCapture {
    /// Append a captured flow; a failed capture is logged and never fails the exchange
    fn record(&self, id: u64, captured: Result<Flow>) {
        match captured {
            Ok(flow) => {
                debug!(
                    "Captured flow {}: {} {} -> {}",
                    id, flow.request.method, flow.request.url, flow.response.status
                );
                self.flows.append(flow);
            }
            Err(e) => error!("Flow {} not captured: {}", id, e),
        }
    }
}

fn capture(
    id: u64,
    request: &HttpRequest,
    exchange: &Exchange,
    response: &HttpResponse,
) -> Result<Flow> {
    Ok(Flow {
        id,
        duration: exchange.elapsed(),
        started_at: exchange.started_at(),
        request: capture_request(request, exchange)?,
        response: capture_response(response, exchange),
    })
}

fn capture_request(request: &HttpRequest, exchange: &Exchange) -> Result<FlowRequest> {
    let body = if exchange.request_body_held() {
        decode_body(request.headers(), request.body().as_ref())
    } else {
        request.body().as_ref().map(|body| FlowBody::placeholder(body.len()))
    };

    Ok(FlowRequest {
        method: request.method().as_str().to_string(),
        url: absolute_url(exchange)?,
        host: exchange.host().unwrap_or_default().to_string(),
        headers: joined_headers(request.headers()),
        body,
    })
}

fn capture_response(response: &HttpResponse, exchange: &Exchange) -> FlowResponse {
    let body = response.body().as_ref().and_then(|payload| {
        match exchange.reserve(payload.len()) {
            // Released once the body has been rendered
            Some(_permit) => decode_body(response.headers(), Some(payload)),
            None => Some(FlowBody::placeholder(payload.len())),
        }
    });

    FlowResponse {
        status: response.status().as_u16(),
        headers: joined_headers(response.headers()),
        body,
    }
}

/// `scheme://host/path?query` as the client addressed it
///
/// A Host header that does not form a valid URL is recorded as `unknown`.
fn absolute_url(exchange: &Exchange) -> Result<Url> {
    let base = format!("{}://{}/", exchange.scheme(), exchange.host().unwrap_or("unknown"));
    let mut url = match Url::parse(&base) {
        Ok(url) => url,
        Err(e) => {
            warn!("Cannot build flow URL from {}: {}", base, e);
            Url::parse(&format!("{}://unknown/", exchange.scheme()))
                .map_err(|e| ProxyError::Other(format!("Invalid flow URL: {}", e)))?
        }
    };

    url.set_path(exchange.path());
    url.set_query(exchange.query());
    Ok(url)
}
