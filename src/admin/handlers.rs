//! Admin API Request Handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;

use crate::admin::error::{AdminError, AdminResult};
use crate::admin::server::AdminState;
use crate::flow::{Flow, FlowFilter, FlowSummary};

/// File name offered to browsers downloading the root certificate
pub const CA_DOWNLOAD_NAME: &str = "mitmproxy.pem";

/// Regex filters accepted by the flow list endpoint
#[derive(Debug, Default, Deserialize)]
pub struct FlowQuery {
    pub method: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// List captured flows, oldest first
///
/// Empty query values are treated as absent.
pub async fn list_flows(
    State(state): State<AdminState>,
    Query(query): Query<FlowQuery>,
) -> AdminResult<Json<Vec<FlowSummary>>> {
    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.is_empty())
    }

    let filter = FlowFilter::new(
        non_empty(&query.method),
        non_empty(&query.host),
        non_empty(&query.path),
    )?;

    let summaries: Vec<FlowSummary> = state
        .flows
        .list(&filter)
        .iter()
        .map(|flow| flow.summary())
        .collect();

    log::debug!("Listing {} flows", summaries.len());
    Ok(Json(summaries))
}

/// Full record of one flow
pub async fn get_flow(
    State(state): State<AdminState>,
    Path(id): Path<u64>,
) -> AdminResult<Json<Flow>> {
    state
        .flows
        .get(id)
        .map(|flow| Json(flow.as_ref().clone()))
        .ok_or_else(|| AdminError::NotFound(format!("flow {}", id)))
}

/// Root certificate download for client installation
pub async fn download_certificate(State(state): State<AdminState>) -> AdminResult<Response> {
    let pem = state.authority.to_pem()?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", CA_DOWNLOAD_NAME),
            ),
        ],
        pem,
    )
        .into_response())
}
