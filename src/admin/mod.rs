//! Admin API Module
//!
//! Read-only HTTP surface over the running proxy:
//! - `GET /api/flow` lists captured flows, filtered by `method`, `host` and
//!   `path` regexes
//! - `GET /api/flow/:id` returns one full flow
//! - `GET /ssl` downloads the root certificate for client installation
//! - `GET /health` liveness probe
//!
//! # Architecture
//!
//! The admin API is embedded in the main process and runs on the tokio
//! runtime. It uses axum for HTTP handling and tower for middleware.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::{AdminError, AdminResult};
pub use server::{build_router, start_admin_server, AdminState};
