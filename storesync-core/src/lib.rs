//! StoreSync Core Engine
//! Resilient parallel synchronization for large seller-store populations.
//!
//! The engine repeatedly drives an expensive, failure-prone, per-store
//! remote sync operation across 1500+ stores under a fixed concurrency
//! budget, while guaranteeing that one misbehaving store cannot stall or
//! cascade-fail the rest of the population.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod resilience;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::SyncConfig;
pub use engine::{RunResult, SyncEngine};
pub use error::{Error, Result};
pub use metrics::{InFlightGuard, MetricsSink, MetricsSnapshot, SyncMetrics};
pub use resilience::circuit::CircuitState;
pub use resilience::executor::{AttemptOutcome, ResilientExecutor};
pub use store::{InMemoryStoreProvider, Store, StoreProvider};
pub use sync::{
    CompositeSyncOperation, NoLimit, RateLimiter, StoreSyncOperation, StoreSyncReport, SyncMode,
    SyncStep, WindowRateLimiter,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(!VERSION.is_empty());
    }
}
