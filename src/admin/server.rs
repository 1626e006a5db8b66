//! Admin HTTP Server Module
//!
//! This module sets up the HTTP server for the admin API using axum.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::admin::error::{AdminError, AdminResult};
use crate::admin::handlers;
use crate::ca::CertificateAuthority;
use crate::flow::FlowStore;

/// Shared state behind every admin route
#[derive(Clone)]
pub struct AdminState {
    /// Captured flows
    pub flows: Arc<FlowStore>,

    /// Root CA served for download
    pub authority: Arc<CertificateAuthority>,
}

impl AdminState {
    pub fn new(flows: Arc<FlowStore>, authority: Arc<CertificateAuthority>) -> Self {
        Self { flows, authority }
    }
}

/// Start the admin HTTP server
///
/// Serves until `shutdown` resolves.
///
/// # Parameters
///
/// * `listen_addr` - Address to bind
/// * `state` - Stores exposed by the routes
/// * `shutdown` - Graceful shutdown signal
///
/// # Errors
///
/// Returns [`AdminError::Io`] when the address cannot be bound.
pub async fn start_admin_server<F>(
    listen_addr: SocketAddr,
    state: AdminState,
    shutdown: F,
) -> AdminResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("Admin API server listening on {}", listen_addr);

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))?;

    log::info!("Admin API server stopped");
    Ok(())
}

/// Build the application router with all routes
pub fn build_router(state: AdminState) -> Router {
    let api_router = Router::new()
        .route("/flow", get(handlers::list_flows))
        .route("/flow/:id", get(handlers::get_flow));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ssl", get(handlers::download_certificate))
        .nest("/api", api_router)
        .with_state(state)
        // Add tracing to all routes
        .layer(TraceLayer::new_for_http())
}
