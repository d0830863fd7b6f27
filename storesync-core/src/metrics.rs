//! Engine metrics tracking and monitoring.
//!
//! The core logic only depends on the [`MetricsSink`] trait; callers can
//! bridge it to whatever registry they run in production. [`SyncMetrics`]
//! is the built-in atomic implementation.

use std::{
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
    time::Duration,
};

use serde::Serialize;

use crate::resilience::circuit::CircuitState;

/// Receiver for engine observability events.
///
/// Counters are append-only and must be safe for concurrent increment.
pub trait MetricsSink: Send + Sync {
    /// One store synced successfully
    fn incr_success(&self);
    /// One store sync failed (error or timeout)
    fn incr_failure(&self);
    /// One operation exceeded its deadline
    fn incr_timeout(&self);
    /// One attempt rejected because the store already had a sync in flight
    fn incr_bulkhead_rejected(&self);
    /// A circuit breaker transitioned into `state`
    fn circuit_transition(&self, state: CircuitState);
    /// A full run completed in `elapsed`
    fn record_run_duration(&self, elapsed: Duration);
    /// A store sync started executing
    fn incr_in_flight(&self);
    /// A store sync finished executing
    fn decr_in_flight(&self);
}

/// Atomic counter implementation of [`MetricsSink`].
#[derive(Debug, Default)]
pub struct SyncMetrics {
    success: AtomicU64,
    failure: AtomicU64,
    timeouts: AtomicU64,
    bulkhead_rejected: AtomicU64,
    circuit_opened: AtomicU64,
    circuit_half_opened: AtomicU64,
    circuit_closed: AtomicU64,
    runs_completed: AtomicU64,
    last_run_millis: AtomicU64,
    in_flight: AtomicI64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            bulkhead_rejected: self.bulkhead_rejected.load(Ordering::Relaxed),
            circuit_opened: self.circuit_opened.load(Ordering::Relaxed),
            circuit_half_opened: self.circuit_half_opened.load(Ordering::Relaxed),
            circuit_closed: self.circuit_closed.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            last_run_millis: self.last_run_millis.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for SyncMetrics {
    fn incr_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    fn incr_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    fn incr_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn incr_bulkhead_rejected(&self) {
        self.bulkhead_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn circuit_transition(&self, state: CircuitState) {
        let counter = match state {
            CircuitState::Open => &self.circuit_opened,
            CircuitState::HalfOpen => &self.circuit_half_opened,
            CircuitState::Closed => &self.circuit_closed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_run_duration(&self, elapsed: Duration) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.last_run_millis
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    fn incr_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    fn decr_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Tracks one executing store sync on the in-flight gauge.
///
/// Decrements on drop, so the gauge stays balanced even when the tracked
/// future is cancelled by a deadline or an aborted worker.
pub struct InFlightGuard {
    metrics: std::sync::Arc<dyn MetricsSink>,
}

impl InFlightGuard {
    pub fn new(metrics: std::sync::Arc<dyn MetricsSink>) -> Self {
        metrics.incr_in_flight();
        Self { metrics }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.decr_in_flight();
    }
}

/// Engine metrics at a point in time.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub success: u64,
    pub failure: u64,
    pub timeouts: u64,
    pub bulkhead_rejected: u64,
    pub circuit_opened: u64,
    pub circuit_half_opened: u64,
    pub circuit_closed: u64,
    pub runs_completed: u64,
    pub last_run_millis: u64,
    pub in_flight: i64,
}
