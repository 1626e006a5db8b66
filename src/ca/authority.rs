//! Certificate authority identity

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default key store alias, also used for the exported file names
pub const DEFAULT_ALIAS: &str = "mitmproxy";

/// Default key store password
pub const DEFAULT_PASSWORD: &str = "be your own lantern";

/// Default CA common name; the whole default identity is the generic
/// `mitmproxy` one and can be replaced through configuration
pub const DEFAULT_COMMON_NAME: &str = "mitmproxy";

/// Default CA organization
pub const DEFAULT_ORGANIZATION: &str = "mitmproxy";

/// Default CA organizational unit
pub const DEFAULT_ORGANIZATIONAL_UNIT: &str = "Engineering";

/// Identity of the root CA and of the leaves it issues
///
/// Immutable once the process is running. Equality and hashing compare every
/// field by content, the password included.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Authority {
    /// Key store alias; names `<alias>.p12` and `<alias>.pem`
    pub alias: String,

    /// Key store password
    pub password: String,

    /// Root certificate common name
    pub common_name: String,

    /// Root certificate organization
    pub organization: String,

    /// Root certificate organizational unit
    pub organizational_unit: String,

    /// Organization stamped onto issued leaf certificates
    pub cert_organization: String,

    /// Organizational unit stamped onto issued leaf certificates
    pub cert_organizational_unit: String,
}

impl Default for Authority {
    fn default() -> Self {
        Self {
            alias: DEFAULT_ALIAS.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            common_name: DEFAULT_COMMON_NAME.to_string(),
            organization: DEFAULT_ORGANIZATION.to_string(),
            organizational_unit: DEFAULT_ORGANIZATIONAL_UNIT.to_string(),
            cert_organization: DEFAULT_ORGANIZATION.to_string(),
            cert_organizational_unit: DEFAULT_ORGANIZATIONAL_UNIT.to_string(),
        }
    }
}

impl Authority {
    /// Path of the PKCS#12 key store inside `dir`
    pub fn keystore_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.p12", self.alias))
    }

    /// Path of the exported PEM certificate inside `dir`
    pub fn pem_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.pem", self.alias))
    }
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authority")
            .field("alias", &self.alias)
            .field("password", &"<redacted>")
            .field("common_name", &self.common_name)
            .field("organization", &self.organization)
            .field("organizational_unit", &self.organizational_unit)
            .field("cert_organization", &self.cert_organization)
            .field("cert_organizational_unit", &self.cert_organizational_unit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_password_compared_by_content() {
        let a = Authority::default();
        let mut b = Authority::default();
        b.password = String::from("be your own ") + "lantern";
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));

        b.password.push('!');
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", Authority::default());
        assert!(!rendered.contains(DEFAULT_PASSWORD));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_default_identity() {
        let authority = Authority::default();
        assert_eq!(authority.alias, "mitmproxy");
        assert_eq!(authority.common_name, "mitmproxy");
        assert_eq!(authority.organization, "mitmproxy");
        assert_eq!(authority.organizational_unit, "Engineering");
        assert_eq!(authority.cert_organization, authority.organization);
        assert_eq!(authority.cert_organizational_unit, authority.organizational_unit);
    }

    #[test]
    fn test_identity_overrides_from_config() {
        let authority: Authority =
            serde_json::from_str(r#"{"common_name": "Corp Proxy CA", "organization": "Corp"}"#)
                .unwrap();
        assert_eq!(authority.common_name, "Corp Proxy CA");
        assert_eq!(authority.organization, "Corp");
        assert_eq!(authority.alias, DEFAULT_ALIAS);
    }

    #[test]
    fn test_artifact_paths() {
        let authority = Authority::default();
        let dir = Path::new("certs");
        assert_eq!(authority.keystore_path(dir), dir.join("mitmproxy.p12"));
        assert_eq!(authority.pem_path(dir), dir.join("mitmproxy.pem"));
    }
}
