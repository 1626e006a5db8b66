//! Declarative mapping rules

use std::path::PathBuf;

use bytes::Bytes;
use log::info;
use serde::{Deserialize, Serialize};

use crate::common::{fs::read_file, ProxyError, Result};
use crate::mapping::{LocationPatternBuilder, MappingRegistry, RemoteTarget};

/// Mapping rules loaded at startup, in match order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingConfig {
    pub local: Vec<LocalMapping>,
    pub remote: Vec<RemoteMapping>,
}

/// Stub a request with inline text or the contents of a file
///
/// Exactly one of `text` and `file` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalMapping {
    pub from: LocationPatternBuilder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Redirect a request to another destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteMapping {
    pub from: LocationPatternBuilder,
    pub to: RemoteTarget,
}

impl LocalMapping {
    /// Stub content
    ///
    /// # Errors
    ///
    /// [`ProxyError::Mapping`] unless exactly one source is set, or the I/O
    /// error from reading `file`.
    pub fn content(&self) -> Result<Bytes> {
        match (&self.text, &self.file) {
            (Some(text), None) => Ok(Bytes::from(text.clone())),
            (None, Some(path)) => Ok(Bytes::from(read_file(path)?)),
            _ => Err(ProxyError::Mapping(
                "a local mapping needs exactly one of text or file".to_string(),
            )),
        }
    }
}

impl MappingConfig {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }

    /// Register every rule with `registry`, in order
    pub fn apply(&self, registry: &MappingRegistry) -> Result<()> {
        for local in &self.local {
            let pattern = local.from.clone().build()?;
            registry.map_to_local(pattern, local.content()?);
        }

        for remote in &self.remote {
            let pattern = remote.from.clone().build()?;
            registry.map_to_remote(pattern, remote.to.clone());
        }

        info!(
            "Loaded {} local and {} remote mappings",
            self.local.len(),
            self.remote.len()
        );

        Ok(())
    }
}
