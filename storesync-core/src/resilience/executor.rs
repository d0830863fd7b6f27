//! Resilient per-store execution.
//!
//! [`ResilientExecutor`] composes circuit breaker, bulkhead and timeout
//! guard around one store's sync operation:
//!
//! 1. circuit check — an open circuit rejects the call cheaply, without
//!    consuming a concurrency slot or touching the bulkhead;
//! 2. bulkhead try-acquire — a store with an attempt already in flight
//!    is rejected rather than queued;
//! 3. the operation itself, under the per-store deadline; the outcome is
//!    recorded back into the breaker.
//!
//! Breaker and bulkhead entries are created lazily on first reference and
//! live for the process lifetime. Each store's entry is its own lock
//! domain: operations on store A never contend with store B.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::time;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::metrics::{InFlightGuard, MetricsSink};
use crate::resilience::bulkhead::Bulkhead;
use crate::resilience::circuit::{CircuitBreaker, CircuitState};
use crate::store::Store;
use crate::sync::{StoreSyncOperation, StoreSyncReport, SyncMode};

/// Tagged result of one store's resilient invocation.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The operation completed within its deadline
    Success(StoreSyncReport),
    /// Rejected: the store's circuit is open
    CircuitOpen,
    /// Rejected: the store already has an attempt in flight
    BulkheadFull,
    /// The operation exceeded its deadline
    Timeout,
    /// The operation failed; the message is preserved for logging
    Error(String),
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::CircuitOpen => "circuit_open",
            AttemptOutcome::BulkheadFull => "bulkhead_full",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::Error(_) => "error",
        }
    }
}

/// Executes per-store operations under full resilience protection.
pub struct ResilientExecutor {
    config: SyncConfig,
    /// Per-store breakers, created lazily, never removed
    circuits: RwLock<HashMap<Uuid, Arc<Mutex<CircuitBreaker>>>>,
    /// Per-store bulkheads, created lazily, never removed
    bulkheads: RwLock<HashMap<Uuid, Bulkhead>>,
    metrics: Arc<dyn MetricsSink>,
}

impl ResilientExecutor {
    pub fn new(config: SyncConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
            bulkheads: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Runs `operation` for `store` behind the circuit breaker, bulkhead
    /// and timeout guard, and records the outcome into the breaker.
    pub async fn execute(
        &self,
        store: &Store,
        operation: &dyn StoreSyncOperation,
        mode: SyncMode,
    ) -> AttemptOutcome {
        let circuit = self.circuit(store.id).await;

        if !circuit.lock().await.allow() {
            warn!(store = %store.name, "circuit open - rejecting sync");
            return AttemptOutcome::CircuitOpen;
        }

        let bulkhead = self.bulkhead(store.id).await;
        let Some(_permit) = bulkhead.try_acquire() else {
            self.metrics.incr_bulkhead_rejected();
            warn!(store = %store.name, "bulkhead full - rejecting sync");
            return AttemptOutcome::BulkheadFull;
        };

        // Drop-safe gauge tracking: the decrement happens even when this
        // future is cancelled by the orchestrator's outer deadline.
        let _in_flight = InFlightGuard::new(self.metrics.clone());
        match time::timeout(
            self.config.store_timeout,
            operation.run(store, mode),
        )
        .await
        {
            Ok(Ok(report)) => {
                circuit.lock().await.record_success();
                AttemptOutcome::Success(report)
            }
            Ok(Err(e)) => {
                circuit.lock().await.record_failure();
                error!(store = %store.name, error = %e, "sync operation failed");
                AttemptOutcome::Error(e.to_string())
            }
            // The timed-out future is dropped here, so a late completion
            // can no longer mutate shared state.
            Err(_) => {
                self.metrics.incr_timeout();
                circuit.lock().await.record_failure();
                error!(
                    store = %store.name,
                    timeout_secs = self.config.store_timeout.as_secs(),
                    "sync operation timed out"
                );
                AttemptOutcome::Timeout
            }
        }
    }

    /// Records an outer-deadline expiry observed by the orchestrator as a
    /// timeout failure against the store's breaker.
    pub async fn note_timeout(&self, store_id: Uuid) {
        self.metrics.incr_timeout();
        let circuit = self.circuit(store_id).await;
        circuit.lock().await.record_failure();
    }

    /// Read-only snapshot of every known store's circuit state.
    pub async fn circuit_states(&self) -> HashMap<Uuid, CircuitState> {
        let circuits = self.circuits.read().await;
        let mut states = HashMap::with_capacity(circuits.len());
        for (store_id, circuit) in circuits.iter() {
            states.insert(*store_id, circuit.lock().await.state());
        }
        states
    }

    /// Stores whose circuit is currently open.
    pub async fn open_circuits(&self) -> Vec<Uuid> {
        let circuits = self.circuits.read().await;
        let mut open = Vec::new();
        for (store_id, circuit) in circuits.iter() {
            if circuit.lock().await.state() == CircuitState::Open {
                open.push(*store_id);
            }
        }
        open
    }

    /// Forces a store's breaker back to closed. Returns false when the
    /// store has never been executed.
    pub async fn reset_circuit(&self, store_id: Uuid) -> bool {
        let circuits = self.circuits.read().await;
        match circuits.get(&store_id) {
            Some(circuit) => {
                circuit.lock().await.reset();
                true
            }
            None => false,
        }
    }

    async fn circuit(&self, store_id: Uuid) -> Arc<Mutex<CircuitBreaker>> {
        if let Some(circuit) = self.circuits.read().await.get(&store_id) {
            return circuit.clone();
        }
        let mut circuits = self.circuits.write().await;
        circuits
            .entry(store_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(CircuitBreaker::new(
                    self.config.failure_threshold,
                    self.config.open_duration,
                    self.config.half_open_permits,
                    self.metrics.clone(),
                )))
            })
            .clone()
    }

    async fn bulkhead(&self, store_id: Uuid) -> Bulkhead {
        if let Some(bulkhead) = self.bulkheads.read().await.get(&store_id) {
            return bulkhead.clone();
        }
        let mut bulkheads = self.bulkheads.write().await;
        bulkheads
            .entry(store_id)
            .or_insert_with(|| Bulkhead::new(self.config.bulkhead_capacity))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::metrics::SyncMetrics;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct TestOperation {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl TestOperation {
        fn succeeding() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
                delay: Duration::ZERO,
            }
        }

        fn hanging() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::from_secs(3600),
            }
        }
    }

    #[async_trait]
    impl StoreSyncOperation for TestOperation {
        async fn run(&self, store: &Store, _mode: SyncMode) -> Result<StoreSyncReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(Error::step("Orders: connection refused"));
            }
            Ok(StoreSyncReport::success(store.id))
        }
    }

    fn executor(config: SyncConfig) -> (ResilientExecutor, Arc<SyncMetrics>) {
        let metrics = Arc::new(SyncMetrics::new());
        (ResilientExecutor::new(config, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_success_path() {
        let (executor, _) = executor(SyncConfig::default());
        let store = Store::new("alpha", "trendyol");
        let op = TestOperation::succeeding();

        let outcome = executor.execute(&store, &op, SyncMode::Full).await;
        assert!(matches!(outcome, AttemptOutcome::Success(_)));
        assert_eq!(op.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_records_breaker_failure() {
        let (executor, _) = executor(SyncConfig::default());
        let store = Store::new("alpha", "trendyol");
        let op = TestOperation::failing();

        let outcome = executor.execute(&store, &op, SyncMode::Full).await;
        assert!(matches!(outcome, AttemptOutcome::Error(_)));

        let circuit = executor.circuit(store.id).await;
        assert_eq!(circuit.lock().await.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_invoking_operation() {
        let mut config = SyncConfig::default();
        config.failure_threshold = 1;
        let (executor, _) = executor(config);
        let store = Store::new("alpha", "trendyol");

        let failing = TestOperation::failing();
        executor.execute(&store, &failing, SyncMode::Full).await;

        let op = TestOperation::succeeding();
        let outcome = executor.execute(&store, &op, SyncMode::Full).await;
        assert!(matches!(outcome, AttemptOutcome::CircuitOpen));
        assert_eq!(op.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bulkhead_full_rejects_concurrent_attempt() {
        let (executor, metrics) = executor(SyncConfig::default());
        let store = Store::new("alpha", "trendyol");

        // Hold the store's only permit, then attempt a sync.
        let bulkhead = executor.bulkhead(store.id).await;
        let _held = bulkhead.try_acquire().unwrap();

        let op = TestOperation::succeeding();
        let outcome = executor.execute(&store, &op, SyncMode::Full).await;
        assert!(matches!(outcome, AttemptOutcome::BulkheadFull));
        assert_eq!(op.calls.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.snapshot().bulkhead_rejected, 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_breaker_failure() {
        let mut config = SyncConfig::default();
        config.store_timeout = Duration::from_millis(50);
        config.task_deadline = Duration::from_millis(100);
        let (executor, metrics) = executor(config);
        let store = Store::new("alpha", "trendyol");

        let op = TestOperation::hanging();
        let outcome = executor.execute(&store, &op, SyncMode::Full).await;
        assert!(matches!(outcome, AttemptOutcome::Timeout));
        assert_eq!(metrics.snapshot().timeouts, 1);

        let circuit = executor.circuit(store.id).await;
        assert_eq!(circuit.lock().await.consecutive_failures(), 1);
        // The bulkhead permit was released despite the cancellation.
        let bulkhead = executor.bulkhead(store.id).await;
        assert_eq!(bulkhead.available(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_gauge_survives_cancellation() {
        let (executor, metrics) = executor(SyncConfig::default());
        let store = Store::new("alpha", "trendyol");
        let op = TestOperation::hanging();

        // Cancel execute() mid-operation, the way the orchestrator's
        // outer task deadline does.
        let attempt = executor.execute(&store, &op, SyncMode::Full);
        assert!(tokio::time::timeout(Duration::from_millis(50), attempt)
            .await
            .is_err());

        assert_eq!(metrics.snapshot().in_flight, 0);
        // The bulkhead permit was released by the cancellation too.
        let bulkhead = executor.bulkhead(store.id).await;
        assert_eq!(bulkhead.available(), 1);
    }

    #[tokio::test]
    async fn test_reset_circuit() {
        let mut config = SyncConfig::default();
        config.failure_threshold = 1;
        let (executor, _) = executor(config);
        let store = Store::new("alpha", "trendyol");

        executor
            .execute(&store, &TestOperation::failing(), SyncMode::Full)
            .await;
        assert_eq!(executor.open_circuits().await, vec![store.id]);

        assert!(executor.reset_circuit(store.id).await);
        let states = executor.circuit_states().await;
        assert_eq!(states[&store.id], CircuitState::Closed);

        // Unknown store: nothing to reset.
        assert!(!executor.reset_circuit(Uuid::new_v4()).await);
    }
}
