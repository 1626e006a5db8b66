//! Capture buffer budget
//!
//! Bodies held for flow capture are accounted against a shared byte budget.
//! A reservation is returned to the pool when its [`BufferPermit`] drops, so
//! an exchange torn down half way still gives its bytes back.

use std::sync::Arc;

use log::debug;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A shared byte budget for buffered bodies
///
/// Cloning is cheap; clones draw from the same budget.
#[derive(Clone, Debug)]
pub struct BufferPool {
    /// One permit per byte
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Bytes reserved from a [`BufferPool`]
///
/// Released back to the pool on drop.
#[derive(Debug)]
pub struct BufferPermit {
    len: usize,
    _permit: Option<OwnedSemaphorePermit>,
}

impl BufferPermit {
    /// Number of bytes this permit holds
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl BufferPool {
    /// Create a pool
    ///
    /// # Parameters
    ///
    /// * `capacity` - Total bytes that may be reserved at once
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Reserve `len` bytes without waiting
    ///
    /// # Returns
    ///
    /// `None` when the budget cannot cover `len` right now.
    pub fn try_reserve(&self, len: usize) -> Option<BufferPermit> {
        if len == 0 {
            return Some(BufferPermit { len, _permit: None });
        }

        let permits = u32::try_from(len).ok()?;
        match Arc::clone(&self.semaphore).try_acquire_many_owned(permits) {
            Ok(permit) => Some(BufferPermit {
                len,
                _permit: Some(permit),
            }),
            Err(_) => {
                debug!(
                    "Capture budget exhausted: wanted {} bytes, {} available",
                    len,
                    self.available()
                );
                None
            }
        }
    }

    /// Bytes currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool() {
        // A pool with room for 10 bytes
        let pool = BufferPool::new(10);

        let first = pool.try_reserve(6).unwrap();
        assert_eq!(first.len(), 6);
        assert_eq!(pool.available(), 4);

        // Does not fit
        assert!(pool.try_reserve(5).is_none());

        // Dropping gives the bytes back
        drop(first);
        assert_eq!(pool.available(), 10);
        assert!(pool.try_reserve(10).is_some());
    }

    #[test]
    fn test_empty_reservation_always_succeeds() {
        let pool = BufferPool::new(0);
        let permit = pool.try_reserve(0).unwrap();
        assert!(permit.is_empty());
    }

    #[test]
    fn test_clones_share_budget() {
        let pool = BufferPool::new(8);
        let clone = pool.clone();
        let _held = clone.try_reserve(8).unwrap();
        assert_eq!(pool.available(), 0);
        assert!(pool.try_reserve(1).is_none());
    }
}
