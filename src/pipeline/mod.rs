//! Interception pipeline
//!
//! Every exchange runs through two chains of [`Middleware`]:
//!
//! | Leg      | Order                                                          |
//! |----------|----------------------------------------------------------------|
//! | outbound | bootstrap, [`MapToLocal`], [`MapToRemote`]                     |
//! | inbound  | bootstrap, [`Instrumentation`], [`FlowCapture`], [`Terminal`] |
//!
//! The outbound chain may answer in place of the origin. The inbound chain
//! always sees the final response, however it was obtained, and records it.

pub mod capture;
pub mod chain;
pub mod exchange;
pub mod interceptor;
pub mod mapping;
pub mod terminal;

pub use capture::{FlowCapture, Instrumentation};
pub use chain::{ChainError, Direction, HttpRequest, HttpResponse, Middleware, Pipeline};
pub use exchange::Exchange;
pub use interceptor::{Interceptor, ProxyContext};
pub use mapping::{remote_url, MapToLocal, MapToRemote};
pub use terminal::Terminal;
