//! Batch orchestration across the store population.
//!
//! [`SyncEngine::run`] partitions the eligible stores into fixed-size
//! batches and drives every store of a batch concurrently through the
//! resilient executor on the bounded worker pool. Batches form an
//! explicit barrier: no store of batch N+1 starts before batch N has
//! fully settled. Sequential batches cap peak memory and connection
//! usage and give natural checkpoints for progress logging.
//!
//! No per-store outcome ever escapes the orchestrator as an error; every
//! outcome is folded into the run counters. Even a failure to enumerate
//! stores returns a zeroed result instead of crashing the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::metrics::MetricsSink;
use crate::pool::BoundedWorkerPool;
use crate::resilience::circuit::CircuitState;
use crate::resilience::executor::{AttemptOutcome, ResilientExecutor};
use crate::store::{Store, StoreProvider};
use crate::sync::{StoreSyncOperation, SyncMode};

/// Aggregate counters for one run over the population.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunResult {
    pub success_count: usize,
    pub failure_count: usize,
    /// Stores rejected by an open circuit or a full bulkhead
    pub skipped_count: usize,
}

impl RunResult {
    pub fn total_count(&self) -> usize {
        self.success_count + self.failure_count + self.skipped_count
    }

    /// Success percentage over processed (non-skipped) stores.
    pub fn success_rate(&self) -> f64 {
        let processed = self.success_count + self.failure_count;
        if processed == 0 {
            return 0.0;
        }
        self.success_count as f64 / processed as f64 * 100.0
    }
}

/// Resilient parallel sync engine over a store population.
pub struct SyncEngine {
    config: SyncConfig,
    stores: Arc<dyn StoreProvider>,
    executor: Arc<ResilientExecutor>,
    pool: BoundedWorkerPool,
    metrics: Arc<dyn MetricsSink>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        stores: Arc<dyn StoreProvider>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        let executor = Arc::new(ResilientExecutor::new(config.clone(), metrics.clone()));
        let pool = BoundedWorkerPool::new(config.parallel_workers, config.queue_bound);
        info!(
            workers = config.parallel_workers,
            batch_size = config.batch_size,
            store_timeout_secs = config.store_timeout.as_secs(),
            "sync engine initialized"
        );
        Ok(Self {
            config,
            stores,
            executor,
            pool,
            metrics,
        })
    }

    /// Runs `operation` once for every eligible store, in sequential
    /// batches, and returns the aggregated counters.
    pub async fn run(&self, operation: Arc<dyn StoreSyncOperation>, mode: SyncMode) -> RunResult {
        let started = Instant::now();

        let stores = match self.stores.stores().await {
            Ok(stores) => stores,
            Err(e) => {
                error!(error = %e, "failed to enumerate stores - aborting run");
                return RunResult::default();
            }
        };

        let eligible: Vec<Store> = stores
            .iter()
            .filter(|s| s.initial_sync_completed)
            .cloned()
            .collect();

        info!(
            ?mode,
            eligible = eligible.len(),
            total = stores.len(),
            "starting sync run"
        );

        let mut result = RunResult::default();
        if eligible.is_empty() {
            return result;
        }

        let batch_count = eligible.len().div_ceil(self.config.batch_size);
        for (index, batch) in eligible.chunks(self.config.batch_size).enumerate() {
            info!(
                batch = index + 1,
                batches = batch_count,
                size = batch.len(),
                "processing batch"
            );
            self.run_batch(batch, operation.clone(), mode, &mut result)
                .await;
        }

        let elapsed = started.elapsed();
        self.metrics.record_run_duration(elapsed);
        info!(
            success = result.success_count,
            failed = result.failure_count,
            skipped = result.skipped_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "sync run completed"
        );
        result
    }

    /// Submits one resilient invocation per store, then blocks until the
    /// whole batch has settled.
    async fn run_batch(
        &self,
        batch: &[Store],
        operation: Arc<dyn StoreSyncOperation>,
        mode: SyncMode,
        result: &mut RunResult,
    ) {
        // Capacity covers one send per store, so task sends never block.
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<(Uuid, AttemptOutcome)>(batch.len());

        for store in batch {
            let executor = self.executor.clone();
            let operation = operation.clone();
            let outcome_tx = outcome_tx.clone();
            let store = store.clone();
            let deadline = self.config.task_deadline;

            self.pool
                .submit(Box::pin(async move {
                    let outcome =
                        match time::timeout(deadline, executor.execute(&store, operation.as_ref(), mode))
                            .await
                        {
                            Ok(outcome) => outcome,
                            // Outer deadline: the executor never got to
                            // record the result, so book the timeout here.
                            Err(_) => {
                                executor.note_timeout(store.id).await;
                                AttemptOutcome::Timeout
                            }
                        };
                    let _ = outcome_tx.send((store.id, outcome)).await;
                }))
                .await;
        }
        drop(outcome_tx);

        // Batch barrier: exactly one settled outcome per store.
        let mut settled = 0;
        while settled < batch.len() {
            match outcome_rx.recv().await {
                Some((store_id, outcome)) => {
                    settled += 1;
                    self.fold(store_id, outcome, result);
                }
                None => break,
            }
        }
    }

    fn fold(&self, store_id: Uuid, outcome: AttemptOutcome, result: &mut RunResult) {
        match outcome {
            AttemptOutcome::Success(report) => {
                result.success_count += 1;
                self.metrics.incr_success();
                if !report.all_steps_ok {
                    warn!(store = %store_id, errors = %report.summary(), "store synced with step errors");
                }
            }
            AttemptOutcome::Timeout => {
                result.failure_count += 1;
                self.metrics.incr_failure();
            }
            AttemptOutcome::Error(message) => {
                result.failure_count += 1;
                self.metrics.incr_failure();
                warn!(store = %store_id, error = %message, "store sync failed");
            }
            AttemptOutcome::CircuitOpen | AttemptOutcome::BulkheadFull => {
                result.skipped_count += 1;
            }
        }
    }

    /// Read-only circuit snapshot for operational dashboards.
    pub async fn circuit_states(&self) -> HashMap<Uuid, CircuitState> {
        self.executor.circuit_states().await
    }

    /// Stores currently excluded by an open circuit.
    pub async fn open_circuits(&self) -> Vec<Uuid> {
        self.executor.open_circuits().await
    }

    /// Administrative override: force a store's breaker back to closed.
    pub async fn reset_circuit(&self, store_id: Uuid) -> bool {
        self.executor.reset_circuit(store_id).await
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Graceful shutdown of the worker pool within the configured grace
    /// period.
    pub async fn shutdown(self) {
        info!("shutting down sync engine");
        self.pool.shutdown(self.config.shutdown_grace).await;
    }
}
