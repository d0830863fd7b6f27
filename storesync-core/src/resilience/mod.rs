//! Resilience primitives for per-store failure isolation.
//!
//! This module provides functionality for:
//! - Circuit breaking per store (cascading-failure prevention)
//! - Bulkheading per store (resource isolation)
//! - Composing both with a timeout guard around the raw operation
//!
//! The composition order is deliberate: an open circuit rejects the call
//! before any concurrency slot is consumed.

pub mod bulkhead;
pub mod circuit;
pub mod executor;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit::{CircuitBreaker, CircuitState};
pub use executor::{AttemptOutcome, ResilientExecutor};
