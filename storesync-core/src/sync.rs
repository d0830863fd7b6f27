//! Per-store sync operation and its step composition.
//!
//! A store sync is composed of several independent remote-data pulls
//! (orders, products, questions, claims in production). Step failures are
//! isolated *within* the store: one failing step never aborts the
//! remaining steps. Only a failure of the primary step (the core orders
//! pull) is raised to the executor and counted against the store's
//! circuit breaker; everything else yields a partial-success report.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Store;

/// How far back a run reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncMode {
    /// Full history sync
    Full,
    /// Catch-up sync covering the recent window only
    CatchUp,
}

impl SyncMode {
    /// Time window a catch-up run covers; `None` means full history.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            SyncMode::Full => None,
            SyncMode::CatchUp => {
                let end = Utc::now();
                Some((end - chrono::Duration::hours(2), end))
            }
        }
    }
}

/// The opaque per-store operation the engine drives.
///
/// Must be safe to invoke concurrently for different stores. An `Err`
/// return counts against the store's circuit breaker; partial step
/// failures belong in the report instead.
#[async_trait]
pub trait StoreSyncOperation: Send + Sync {
    async fn run(&self, store: &Store, mode: SyncMode) -> Result<StoreSyncReport>;
}

/// One remote-data pull within a store sync.
#[async_trait]
pub trait SyncStep: Send + Sync {
    /// Step name used in failure summaries ("Orders", "Products", ...)
    fn name(&self) -> &str;

    /// Primary steps are the ones whose failure counts against the
    /// circuit breaker.
    fn primary(&self) -> bool {
        false
    }

    async fn run(&self, store: &Store, mode: SyncMode) -> Result<()>;
}

/// A single step's recorded failure.
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub step: String,
    pub message: String,
}

/// Outcome of one store's sync, including which steps failed.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSyncReport {
    pub store_id: Uuid,
    pub all_steps_ok: bool,
    pub failures: Vec<StepFailure>,
}

impl StoreSyncReport {
    pub fn success(store_id: Uuid) -> Self {
        Self {
            store_id,
            all_steps_ok: true,
            failures: Vec::new(),
        }
    }

    /// Human-readable summary of failed steps, e.g.
    /// `"Products: 502 Bad Gateway; Claims: parse error"`.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.step, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// External-service admission control, acquired before each remote call.
///
/// Consumed as an opaque blocking call: `acquire` returns once the caller
/// may proceed.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn acquire(&self, store_id: Uuid);
}

/// Pass-through limiter for tests and offline tooling.
pub struct NoLimit;

#[async_trait]
impl RateLimiter for NoLimit {
    async fn acquire(&self, _store_id: Uuid) {}
}

/// Sliding-window rate limiter keyed per store.
///
/// Unlike an admission check that errors when the window is full, this
/// limiter waits until the oldest request in the window expires.
pub struct WindowRateLimiter {
    max_requests: usize,
    window: Duration,
    requests: RwLock<HashMap<Uuid, Vec<Instant>>>,
}

impl WindowRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            // A zero-capacity window would never admit a call; the
            // full-window branch also relies on a non-empty history.
            max_requests: max_requests.max(1),
            window,
            requests: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for WindowRateLimiter {
    async fn acquire(&self, store_id: Uuid) {
        loop {
            let wait = {
                let now = Instant::now();
                let mut requests = self.requests.write().await;
                let history = requests.entry(store_id).or_default();
                history.retain(|&at| now.duration_since(at) < self.window);

                if history.len() < self.max_requests {
                    history.push(now);
                    return;
                }
                // Window is full; wait for the oldest entry to expire.
                self.window - now.duration_since(history[0])
            };
            time::sleep(wait).await;
        }
    }
}

/// Runs a sequence of [`SyncStep`]s for one store with per-step error
/// isolation and rate-limited admission.
pub struct CompositeSyncOperation {
    steps: Vec<Arc<dyn SyncStep>>,
    limiter: Arc<dyn RateLimiter>,
}

impl CompositeSyncOperation {
    pub fn new(steps: Vec<Arc<dyn SyncStep>>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { steps, limiter }
    }
}

#[async_trait]
impl StoreSyncOperation for CompositeSyncOperation {
    async fn run(&self, store: &Store, mode: SyncMode) -> Result<StoreSyncReport> {
        debug!(store = %store.name, ?mode, "starting store sync");

        let mut failures = Vec::new();
        let mut primary_failure: Option<String> = None;

        for step in &self.steps {
            self.limiter.acquire(store.id).await;

            if let Err(e) = step.run(store, mode).await {
                warn!(
                    store = %store.name,
                    step = step.name(),
                    error = %e,
                    "sync step failed"
                );
                if step.primary() && primary_failure.is_none() {
                    primary_failure = Some(format!("{}: {}", step.name(), e));
                }
                failures.push(StepFailure {
                    step: step.name().to_string(),
                    message: e.to_string(),
                });
            }
        }

        if let Some(message) = primary_failure {
            return Err(Error::step(message));
        }

        if failures.is_empty() {
            debug!(store = %store.name, "store sync completed");
        } else {
            warn!(
                store = %store.name,
                failed_steps = failures.len(),
                "store sync completed with errors"
            );
        }

        Ok(StoreSyncReport {
            store_id: store.id,
            all_steps_ok: failures.is_empty(),
            failures,
        })
    }
}
