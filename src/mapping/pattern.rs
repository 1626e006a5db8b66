//! Request locations and the regex patterns matched against them

use std::fmt;
use std::hash::{Hash, Hasher};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::{ProxyError, Result};

/// Where a request is headed, as seen by the proxy
///
/// `host` is the Host header value (or the URI authority when the header is
/// missing), so it may carry a port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub scheme: String,
    pub host: Option<String>,
    pub path: String,
    pub query: Option<String>,
}

/// A case-insensitive regular expression that must match a whole value
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile `source`
    ///
    /// Anchors are implicit: `old\.example` only matches `old.example`, never
    /// `bold.example.org`. Explicit `^`/`$` are harmless.
    pub fn new(source: &str) -> Result<Self> {
        let regex = RegexBuilder::new(&format!("^(?:{})$", source))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Whether the whole of `value` matches
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(serde::de::Error::custom)
    }
}

/// The "from" side of a mapping rule
///
/// Every field that is set must match; unset fields are wildcards. At least
/// one field is always set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LocationPattern {
    #[serde(skip_serializing_if = "Option::is_none")]
    scheme: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<Pattern>,
}

impl LocationPattern {
    /// Start building a pattern
    pub fn builder() -> LocationPatternBuilder {
        LocationPatternBuilder::default()
    }

    /// Whether `location` satisfies every specified field
    ///
    /// A request without a host is not constrained by a host pattern. A
    /// missing query is matched as the empty string.
    pub fn matches(&self, location: &Location) -> bool {
        let field = |pattern: &Option<Pattern>, value: Option<&str>| match (pattern, value) {
            (None, _) => true,
            (Some(p), Some(v)) => p.is_match(v),
            (Some(_), None) => true,
        };

        field(&self.scheme, Some(location.scheme.as_str()))
            && field(&self.host, location.host.as_deref())
            && field(&self.path, Some(location.path.as_str()))
            && field(&self.query, Some(location.query.as_deref().unwrap_or("")))
    }

    pub fn scheme(&self) -> Option<&Pattern> {
        self.scheme.as_ref()
    }

    pub fn host(&self) -> Option<&Pattern> {
        self.host.as_ref()
    }

    pub fn path(&self) -> Option<&Pattern> {
        self.path.as_ref()
    }

    pub fn query(&self) -> Option<&Pattern> {
        self.query.as_ref()
    }
}

/// Builder for [`LocationPattern`]
///
/// Also the declarative form of a pattern: deserializing does not compile
/// anything until [`build`](Self::build) is called.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocationPatternBuilder {
    #[serde(skip_serializing_if = "Option::is_none")]
    scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<String>,
}

impl LocationPatternBuilder {
    pub fn scheme(mut self, pattern: &str) -> Self {
        self.scheme = Some(pattern.to_string());
        self
    }

    pub fn host(mut self, pattern: &str) -> Self {
        self.host = Some(pattern.to_string());
        self
    }

    pub fn path(mut self, pattern: &str) -> Self {
        self.path = Some(pattern.to_string());
        self
    }

    pub fn query(mut self, pattern: &str) -> Self {
        self.query = Some(pattern.to_string());
        self
    }

    /// Compile the pattern
    ///
    /// # Errors
    ///
    /// * [`ProxyError::Mapping`] when no field is set
    /// * [`ProxyError::Regex`] when a field is not a valid expression
    pub fn build(self) -> Result<LocationPattern> {
        if self.scheme.is_none() && self.host.is_none() && self.path.is_none() && self.query.is_none() {
            return Err(ProxyError::Mapping(
                "a location pattern needs at least one of scheme, host, path or query".to_string(),
            ));
        }

        let compile = |field: Option<String>| field.as_deref().map(Pattern::new).transpose();

        Ok(LocationPattern {
            scheme: compile(self.scheme)?,
            host: compile(self.host)?,
            path: compile(self.path)?,
            query: compile(self.query)?,
        })
    }
}

impl<'de> Deserialize<'de> for LocationPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        LocationPatternBuilder::deserialize(deserializer)?
            .build()
            .map_err(serde::de::Error::custom)
    }
}
