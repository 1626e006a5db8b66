//! Common module
//!
//! This module contains shared errors and utility functions used throughout the application.

pub mod buffer_pool;
pub mod error;
pub mod fs;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use buffer_pool::{BufferPermit, BufferPool};
pub use error::{ProxyError, Result};
pub use log::{init_logger, try_init_logger};
pub use net::{parse_socket_addr, split_authority};
