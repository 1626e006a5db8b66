//! Append-only flow store
//!
//! Ids are handed out by an atomic counter before a flow is captured, so two
//! exchanges can finish in a different order than they started. The store
//! keeps its list sorted by id, which turns the common case (ids arriving in
//! order) into a plain push.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::common::Result;
use crate::flow::model::Flow;
use crate::mapping::Pattern;

/// Optional method/host/path filters, ANDed together
#[derive(Debug, Clone, Default)]
pub struct FlowFilter {
    method: Option<Pattern>,
    host: Option<Pattern>,
    path: Option<Pattern>,
}

impl FlowFilter {
    /// Compile the given filters
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Regex`](crate::common::ProxyError::Regex) when a
    /// filter is not a valid expression.
    pub fn new(method: Option<&str>, host: Option<&str>, path: Option<&str>) -> Result<Self> {
        let compile = |value: Option<&str>| value.map(Pattern::new).transpose();

        Ok(Self {
            method: compile(method)?,
            host: compile(host)?,
            path: compile(path)?,
        })
    }

    pub fn matches(&self, flow: &Flow) -> bool {
        let field = |pattern: &Option<Pattern>, value: &str| {
            pattern.as_ref().map_or(true, |p| p.is_match(value))
        };

        field(&self.method, &flow.request.method)
            && field(&self.host, flow.host())
            && field(&self.path, flow.path())
    }
}

/// Process-wide record of completed exchanges
pub struct FlowStore {
    next_id: AtomicU64,
    flows: RwLock<Vec<Arc<Flow>>>,
}

impl Default for FlowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            flows: RwLock::new(Vec::new()),
        }
    }

    /// Reserve the next flow id; the first call returns 0
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Store a completed flow and hand back the shared record
    pub fn append(&self, flow: Flow) -> Arc<Flow> {
        let flow = Arc::new(flow);
        let mut flows = self.flows.write().unwrap_or_else(PoisonError::into_inner);

        let at = flows.partition_point(|existing| existing.id < flow.id);
        flows.insert(at, Arc::clone(&flow));

        flow
    }

    /// Snapshot of the flows accepted by `filter`, in id order
    pub fn list(&self, filter: &FlowFilter) -> Vec<Arc<Flow>> {
        self.flows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|flow| filter.matches(flow))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<Arc<Flow>> {
        let flows = self.flows.read().unwrap_or_else(PoisonError::into_inner);
        flows
            .binary_search_by_key(&id, |flow| flow.id)
            .ok()
            .map(|at| Arc::clone(&flows[at]))
    }

    pub fn len(&self) -> usize {
        self.flows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::model::{FlowRequest, FlowResponse};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::thread;
    use std::time::Duration;
    use url::Url;

    fn flow(id: u64, method: &str, url: &str) -> Flow {
        let url = Url::parse(url).unwrap();
        Flow {
            id,
            duration: Duration::from_millis(1),
            started_at: Utc::now(),
            request: FlowRequest {
                method: method.to_string(),
                host: url.host_str().unwrap_or_default().to_string(),
                url,
                headers: BTreeMap::new(),
                body: None,
            },
            response: FlowResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: None,
            },
        }
    }

    #[test]
    fn test_ids_start_at_zero() {
        let store = FlowStore::new();
        assert_eq!(store.next_id(), 0);
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = FlowStore::new();
        store.append(flow(0, "GET", "http://a.example/"));
        assert!(store.get(0).is_some());
        assert!(store.get(5).is_none());
    }

    #[test]
    fn test_out_of_order_append_reads_back_sorted() {
        let store = FlowStore::new();
        store.append(flow(2, "GET", "http://a.example/"));
        store.append(flow(0, "GET", "http://a.example/"));
        store.append(flow(1, "GET", "http://a.example/"));

        let ids: Vec<u64> = store.list(&FlowFilter::default()).iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_filters_are_anded() {
        let store = FlowStore::new();
        store.append(flow(store.next_id(), "GET", "http://api.example/users"));
        store.append(flow(store.next_id(), "POST", "http://api.example/users"));
        store.append(flow(store.next_id(), "GET", "http://web.example/users"));

        let filter = FlowFilter::new(Some("get"), Some(r"api\..*"), None).unwrap();
        let matched = store.list(&filter);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 0);

        let filter = FlowFilter::new(None, None, Some("/users")).unwrap();
        assert_eq!(store.list(&filter).len(), 3);

        let filter = FlowFilter::new(None, None, Some("/user")).unwrap();
        assert!(store.list(&filter).is_empty());
    }

    #[test]
    fn test_invalid_filter() {
        assert!(FlowFilter::new(Some("["), None, None).is_err());
    }

    #[test]
    fn test_concurrent_appenders() {
        let store = Arc::new(FlowStore::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let id = store.next_id();
                        store.append(flow(id, "GET", "http://a.example/"));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let ids: Vec<u64> = store.list(&FlowFilter::default()).iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), 400);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
