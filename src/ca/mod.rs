//! Certificate authority module
//!
//! Owns the long-lived root key pair and mints the short-lived per-host leaf
//! certificates presented to intercepted clients.
//!
//! # Certificates
//!
//! | | Root | Leaf |
//! |---|---|---|
//! | Key | RSA-2048 | RSA-1024 |
//! | Validity | now - 1 day .. now + 100 years | now - 1 day .. now + 1 day |
//! | Serial | random 48 bit | random 48 bit |
//! | Basic constraints | critical CA | not a CA |

pub mod authority;
pub mod leaf;
pub mod root;
pub mod serial;

pub use authority::Authority;
pub use leaf::{create_leaf_certificate, SubjectAltName};
pub use root::{create_root_certificate, CertificateAuthority};
