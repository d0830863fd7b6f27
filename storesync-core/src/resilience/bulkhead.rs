//! Bulkhead: per-store concurrency limiter.
//!
//! Caps simultaneous in-flight sync attempts for one store. With the
//! default capacity of 1, a store never has two syncs running at once,
//! independent of which batch or caller triggered them.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded counting permit set for one store.
#[derive(Clone)]
pub struct Bulkhead {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl Bulkhead {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Non-blocking acquisition; fails fast when the store already has
    /// `capacity` attempts in flight.
    pub fn try_acquire(&self) -> Option<BulkheadPermit> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|inner| BulkheadPermit { _inner: inner })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Held permit; dropping it releases the slot exactly once on every exit
/// path, including panic and cancellation.
pub struct BulkheadPermit {
    _inner: OwnedSemaphorePermit,
}
