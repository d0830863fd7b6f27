//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the resilient sync engine.
///
/// Defaults are sized for a population of 1500+ stores behind a shared
/// 10 req/sec marketplace API limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of worker tasks draining the work queue
    pub parallel_workers: usize,
    /// Stores per sequential batch
    pub batch_size: usize,
    /// Bound on pending work; beyond it, submitters run tasks inline
    pub queue_bound: usize,
    /// Deadline for one store's full sync operation
    pub store_timeout: Duration,
    /// Outer per-task deadline applied at submission; must exceed
    /// `store_timeout`
    pub task_deadline: Duration,
    /// Consecutive failures before a store's circuit opens
    pub failure_threshold: u32,
    /// How long an open circuit blocks calls before probing
    pub open_duration: Duration,
    /// Trial calls admitted while a circuit is half-open
    pub half_open_permits: u32,
    /// Maximum concurrent in-flight syncs per store
    pub bulkhead_capacity: usize,
    /// Grace period for worker draining on shutdown
    pub shutdown_grace: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 15,
            batch_size: 50,
            queue_bound: 500,
            store_timeout: Duration::from_secs(120),
            task_deadline: Duration::from_secs(180),
            failure_threshold: 50,
            open_duration: Duration::from_secs(60),
            half_open_permits: 5,
            bulkhead_capacity: 1,
            shutdown_grace: Duration::from_secs(60),
        }
    }
}

impl SyncConfig {
    /// Validates the configuration, rejecting values that would wedge the
    /// engine.
    pub fn validate(&self) -> Result<()> {
        if self.parallel_workers == 0 {
            return Err(Error::config("parallel_workers must be positive"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be positive"));
        }
        if self.queue_bound == 0 {
            return Err(Error::config("queue_bound must be positive"));
        }
        if self.bulkhead_capacity == 0 {
            return Err(Error::config("bulkhead_capacity must be positive"));
        }
        if self.failure_threshold == 0 {
            return Err(Error::config("failure_threshold must be positive"));
        }
        if self.half_open_permits == 0 {
            return Err(Error::config("half_open_permits must be positive"));
        }
        if self.task_deadline < self.store_timeout {
            return Err(Error::config(
                "task_deadline must be at least store_timeout",
            ));
        }
        Ok(())
    }
}
