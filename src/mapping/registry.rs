//! Mapping registry
//!
//! Two ordered rule lists, one resolving to local stub content and one to a
//! remote override. Lookups walk a list in insertion order and return the
//! first matching rule. Writers replace the list wholesale, so readers only
//! ever clone an `Arc` snapshot and never wait on a writer.

use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::mapping::pattern::{Location, LocationPattern};

/// The "to" side of a remote mapping
///
/// Unset fields fall back to the original request: scheme defaults to
/// `http`, host to the original Host header, path and query to the original
/// ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// `host` or `host:port`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl RemoteTarget {
    /// Target that only overrides the host
    pub fn host(host: &str) -> Self {
        Self {
            host: Some(host.to_string()),
            ..Self::default()
        }
    }
}

/// One registered rule
#[derive(Debug, Clone)]
pub struct MappingRule<T> {
    pub pattern: LocationPattern,
    pub target: T,
}

/// Insertion-ordered, copy-on-write rule list
struct RuleList<T> {
    rules: RwLock<Arc<Vec<MappingRule<T>>>>,
}

impl<T: Clone> RuleList<T> {
    fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
        }
    }

    fn snapshot(&self) -> Arc<Vec<MappingRule<T>>> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Insert, or replace the target of an identical pattern in place
    fn upsert(&self, pattern: LocationPattern, target: T) {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let mut rules: Vec<MappingRule<T>> = (**guard).clone();

        match rules.iter_mut().find(|rule| rule.pattern == pattern) {
            Some(rule) => rule.target = target,
            None => rules.push(MappingRule { pattern, target }),
        }

        *guard = Arc::new(rules);
    }

    fn remove(&self, pattern: &LocationPattern) -> bool {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        let rules: Vec<_> = guard
            .iter()
            .filter(|rule| &rule.pattern != pattern)
            .cloned()
            .collect();
        let removed = rules.len() != before;
        *guard = Arc::new(rules);
        removed
    }

    fn find(&self, location: &Location) -> Option<MappingRule<T>> {
        self.snapshot()
            .iter()
            .find(|rule| rule.pattern.matches(location))
            .cloned()
    }
}

/// Process-wide mapping rules
pub struct MappingRegistry {
    locals: RuleList<Bytes>,
    remotes: RuleList<RemoteTarget>,
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self {
            locals: RuleList::new(),
            remotes: RuleList::new(),
        }
    }

    /// Serve `content` for requests matching `pattern`
    ///
    /// Re-registering an identical pattern replaces its content but keeps its
    /// position in the match order.
    pub fn map_to_local(&self, pattern: LocationPattern, content: impl Into<Bytes>) {
        debug!("Mapping {:?} to local content", pattern);
        self.locals.upsert(pattern, content.into());
    }

    /// Redirect requests matching `pattern` to `target`
    ///
    /// Same replacement rules as [`map_to_local`](Self::map_to_local).
    pub fn map_to_remote(&self, pattern: LocationPattern, target: RemoteTarget) {
        debug!("Mapping {:?} to remote {:?}", pattern, target);
        self.remotes.upsert(pattern, target);
    }

    /// Drop a local rule; returns whether one was registered
    pub fn unmap_local(&self, pattern: &LocationPattern) -> bool {
        self.locals.remove(pattern)
    }

    /// Drop a remote rule; returns whether one was registered
    pub fn unmap_remote(&self, pattern: &LocationPattern) -> bool {
        self.remotes.remove(pattern)
    }

    /// First local rule matching `location`
    pub fn find_local(&self, location: &Location) -> Option<Bytes> {
        self.locals.find(location).map(|rule| rule.target)
    }

    /// First remote rule matching `location`
    pub fn find_remote(&self, location: &Location) -> Option<RemoteTarget> {
        self.remotes.find(location).map(|rule| rule.target)
    }

    /// Point-in-time copy of the local rules, in match order
    pub fn locals(&self) -> Arc<Vec<MappingRule<Bytes>>> {
        self.locals.snapshot()
    }

    /// Point-in-time copy of the remote rules, in match order
    pub fn remotes(&self) -> Arc<Vec<MappingRule<RemoteTarget>>> {
        self.remotes.snapshot()
    }
}
