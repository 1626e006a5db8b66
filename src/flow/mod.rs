//! Flow capture
//!
//! Completed exchanges are recorded as immutable [`Flow`]s in a shared
//! [`FlowStore`]. Bodies are rendered best effort by [`decode_body`].

pub mod body;
pub mod model;
pub mod store;

pub use body::{decode_body, FlowBody, TEXT_DECODE_LIMIT};
pub use model::{joined_headers, Flow, FlowRequest, FlowResponse, FlowSummary};
pub use store::{FlowFilter, FlowStore};
