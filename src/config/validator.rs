//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;

/// Validate the configuration
pub fn validate_config(config: &ProxyConfig) -> Result<()> {
    // Validate network settings
    validate_network_settings(config)?;

    // Validate certificate authority settings
    validate_authority_settings(config)?;

    // Validate general settings
    validate_general_settings(config)?;

    // Validate mapping rules
    validate_mappings(config)?;

    Ok(())
}

/// Validate network settings
fn validate_network_settings(config: &ProxyConfig) -> Result<()> {
    if config.listen == config.admin_listen {
        return Err(ProxyError::Config(
            "Proxy and admin listen addresses must be different".to_string(),
        ));
    }

    Ok(())
}

/// Validate certificate authority settings
fn validate_authority_settings(config: &ProxyConfig) -> Result<()> {
    if config.authority.alias.trim().is_empty() {
        return Err(ProxyError::Config("authority.alias must not be empty".to_string()));
    }

    if config.authority.password.is_empty() {
        return Err(ProxyError::Config("authority.password must not be empty".to_string()));
    }

    if config.cert_dir.is_file() {
        return Err(ProxyError::Config(format!(
            "cert_dir is a file: {}",
            config.cert_dir.display()
        )));
    }

    if let Some(ref path) = config.trust_store {
        if !path.is_file() {
            return Err(ProxyError::Config(format!(
                "Trust store not found: {}",
                path.display()
            )));
        }
    }

    Ok(())
}

/// Validate general settings
fn validate_general_settings(config: &ProxyConfig) -> Result<()> {
    // Validate log level
    match config.log_level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => {}
        level => {
            warn!("Invalid log level: {}. Using default: info", level);
        }
    }

    if config.max_buffer_size == 0 {
        return Err(ProxyError::Config(
            "max_buffer_size must be greater than 0".to_string(),
        ));
    }

    if config.leaf_cache_idle_secs == 0 {
        return Err(ProxyError::Config(
            "leaf_cache_idle_secs must be greater than 0".to_string(),
        ));
    }

    for (name, value) in [
        ("connect_timeout_secs", config.connect_timeout_secs),
        ("read_timeout_secs", config.read_timeout_secs),
        ("write_timeout_secs", config.write_timeout_secs),
    ] {
        if value == 0 {
            return Err(ProxyError::Config(format!("{} must be greater than 0", name)));
        }
    }

    Ok(())
}

/// Every rule must compile, and every local rule needs exactly one source
fn validate_mappings(config: &ProxyConfig) -> Result<()> {
    for (index, local) in config.mappings.local.iter().enumerate() {
        local
            .from
            .clone()
            .build()
            .map_err(|e| ProxyError::Config(format!("mappings.local[{}]: {}", index, e)))?;

        if local.text.is_some() == local.file.is_some() {
            return Err(ProxyError::Config(format!(
                "mappings.local[{}]: exactly one of text or file is required",
                index
            )));
        }
    }

    for (index, remote) in config.mappings.remote.iter().enumerate() {
        remote
            .from
            .clone()
            .build()
            .map_err(|e| ProxyError::Config(format!("mappings.remote[{}]: {}", index, e)))?;
    }

    Ok(())
}

/// Configuration validator trait
pub trait ConfigValidator {
    /// Check configuration for warnings
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for ProxyConfig {
    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        // Check log level
        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => {
                warnings.push(format!("Invalid log level '{}', using default 'info'", level));
            }
        }

        if self.trust_all_servers {
            warnings.push("trust_all_servers is enabled: origin certificates are not verified".to_string());
        }

        if !self.admin_listen.ip().is_loopback() {
            warnings.push(format!(
                "Admin server listens on {}: captured flows are readable from the network",
                self.admin_listen
            ));
        }

        for local in &self.mappings.local {
            if let Some(ref path) = local.file {
                if !path.is_file() {
                    warnings.push(format!("Local mapping file not found: {}", path.display()));
                }
            }
        }

        warnings
    }
}

/// Check configuration for warnings (standalone function for backward compatibility)
pub fn check_warnings(config: &ProxyConfig) -> Vec<String> {
    ConfigValidator::check_warnings(config)
}
