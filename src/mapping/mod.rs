//! Mapping module
//!
//! Pattern-based rules that stub a request with local content or redirect it
//! to a different remote target.

pub mod pattern;
pub mod registry;

pub use pattern::{Location, LocationPattern, LocationPatternBuilder, Pattern};
pub use registry::{MappingRegistry, MappingRule, RemoteTarget};
