//! Configuration merging functionality
//!
//! This module provides functionality for merging configurations from different sources.

use crate::config::ProxyConfig;

/// Trait for merging configurations
pub trait ConfigMerger {
    /// Merge another configuration into this one
    ///
    /// Values from `other` override values in `self` when they differ from
    /// the defaults. This is what gives later sources priority.
    fn merge(&self, other: impl AsRef<Self>) -> Self
    where
        Self: Sized;
}

impl ConfigMerger for ProxyConfig {
    fn merge(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let default = Self::default();

        // Take `other` when it moved away from the default
        fn merge_field<T: Clone + PartialEq>(self_val: &T, other_val: &T, default_val: &T) -> T {
            if other_val != default_val {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        fn merge_option<T: Clone>(self_val: &Option<T>, other_val: &Option<T>) -> Option<T> {
            if other_val.is_some() {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        let mut authority = self.authority.clone();
        let (a, o, d) = (&mut authority, &other.authority, &default.authority);
        a.alias = merge_field(&a.alias, &o.alias, &d.alias);
        a.password = merge_field(&a.password, &o.password, &d.password);
        a.common_name = merge_field(&a.common_name, &o.common_name, &d.common_name);
        a.organization = merge_field(&a.organization, &o.organization, &d.organization);
        a.organizational_unit = merge_field(&a.organizational_unit, &o.organizational_unit, &d.organizational_unit);
        a.cert_organization = merge_field(&a.cert_organization, &o.cert_organization, &d.cert_organization);
        a.cert_organizational_unit = merge_field(
            &a.cert_organizational_unit,
            &o.cert_organizational_unit,
            &d.cert_organizational_unit,
        );

        Self {
            listen: merge_field(&self.listen, &other.listen, &default.listen),
            admin_listen: merge_field(&self.admin_listen, &other.admin_listen, &default.admin_listen),
            allow_local_only: merge_field(&self.allow_local_only, &other.allow_local_only, &default.allow_local_only),
            log_level: merge_field(&self.log_level, &other.log_level, &default.log_level),
            max_buffer_size: merge_field(&self.max_buffer_size, &other.max_buffer_size, &default.max_buffer_size),
            cert_dir: merge_field(&self.cert_dir, &other.cert_dir, &default.cert_dir),
            authority,
            leaf_cache_idle_secs: merge_field(
                &self.leaf_cache_idle_secs,
                &other.leaf_cache_idle_secs,
                &default.leaf_cache_idle_secs,
            ),
            trust_all_servers: merge_field(&self.trust_all_servers, &other.trust_all_servers, &default.trust_all_servers),
            send_client_certs: merge_field(&self.send_client_certs, &other.send_client_certs, &default.send_client_certs),
            trust_store: merge_option(&self.trust_store, &other.trust_store),
            connect_timeout_secs: merge_field(
                &self.connect_timeout_secs,
                &other.connect_timeout_secs,
                &default.connect_timeout_secs,
            ),
            read_timeout_secs: merge_field(&self.read_timeout_secs, &other.read_timeout_secs, &default.read_timeout_secs),
            write_timeout_secs: merge_field(
                &self.write_timeout_secs,
                &other.write_timeout_secs,
                &default.write_timeout_secs,
            ),
            mappings: merge_field(&self.mappings, &other.mappings, &default.mappings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_non_default_values() {
        let mut base = ProxyConfig::default();
        base.log_level = "debug".to_string();
        base.read_timeout_secs = 10;

        let mut overlay = ProxyConfig::default();
        overlay.read_timeout_secs = 5;
        overlay.authority.common_name = "Corp Root".to_string();

        let merged = base.merge(overlay);
        assert_eq!(merged.log_level, "debug");
        assert_eq!(merged.read_timeout_secs, 5);
        assert_eq!(merged.authority.common_name, "Corp Root");
        assert_eq!(merged.authority.alias, "mitmproxy");
    }

    #[test]
    fn test_merge_with_default_is_identity() {
        let mut base = ProxyConfig::default();
        base.trust_store = Some("roots.pem".into());
        assert_eq!(base.merge(ProxyConfig::default()), base);
    }
}
