//! Circuit breaker pattern for fault tolerance.
//!
//! One breaker exists per store. After `failure_threshold` consecutive
//! failures the circuit opens and blocks calls for `open_duration`; the
//! first `allow` after the cooldown moves it to half-open, where a small
//! probe budget tests whether the store has healed. A single probe
//! failure re-opens the circuit; a probe success closes it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::metrics::MetricsSink;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, blocking requests
    Open,
    /// Circuit is half-open, testing if the store recovered
    HalfOpen,
}

/// Per-store circuit breaker.
///
/// Methods take `&mut self`; callers are expected to wrap each breaker in
/// its own lock so `allow` / `record_success` / `record_failure` execute
/// under one store-scoped critical section.
pub struct CircuitBreaker {
    state: CircuitState,
    /// Consecutive failures observed while closed
    consecutive_failures: u32,
    /// Probes issued during the current half-open episode
    half_open_probes: u32,
    last_failure: Option<Instant>,
    failure_threshold: u32,
    open_duration: Duration,
    half_open_permits: u32,
    metrics: Arc<dyn MetricsSink>,
}

impl CircuitBreaker {
    pub fn new(
        failure_threshold: u32,
        open_duration: Duration,
        half_open_permits: u32,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_probes: 0,
            last_failure: None,
            failure_threshold,
            open_duration,
            half_open_permits,
            metrics,
        }
    }

    /// Checks whether a call for this store may proceed.
    ///
    /// While open, the call that first observes an elapsed cooldown moves
    /// the breaker to half-open with a fresh probe counter and is
    /// admitted without drawing on the probe budget.
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,

            CircuitState::Open => {
                let cooled_down = self
                    .last_failure
                    .map(|at| at.elapsed() >= self.open_duration)
                    .unwrap_or(true);
                if cooled_down {
                    self.transition(CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }

            CircuitState::HalfOpen => {
                if self.half_open_probes < self.half_open_permits {
                    self.half_open_probes += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call and potentially closes the circuit.
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                self.consecutive_failures = 0;
                self.transition(CircuitState::Closed);
            }
            // Success while open means allow() already moved the state;
            // nothing to do.
            CircuitState::Open => {}
        }
    }

    /// Records a failed call and potentially opens the circuit.
    pub fn record_failure(&mut self) {
        self.last_failure = Some(Instant::now());

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.transition(CircuitState::Open);
                }
            }
            // A single probe failure re-opens the circuit.
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Administrative override: forces the breaker back to closed and
    /// zeroes its counters. Idempotent.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.half_open_probes = 0;
        self.last_failure = None;
        if self.state != CircuitState::Closed {
            self.transition(CircuitState::Closed);
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    fn transition(&mut self, next: CircuitState) {
        let previous = self.state;
        self.state = next;
        if next == CircuitState::HalfOpen {
            self.half_open_probes = 0;
        }
        info!(from = ?previous, to = ?next, "circuit breaker transition");
        self.metrics.circuit_transition(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SyncMetrics;

    fn breaker(threshold: u32, open: Duration, permits: u32) -> (CircuitBreaker, Arc<SyncMetrics>) {
        let metrics = Arc::new(SyncMetrics::new());
        (
            CircuitBreaker::new(threshold, open, permits, metrics.clone()),
            metrics,
        )
    }

    #[test]
    fn test_closed_allows_and_success_resets_failures() {
        let (mut cb, _) = breaker(3, Duration::from_secs(60), 5);
        assert!(cb.allow());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.consecutive_failures(), 2);
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_threshold_trips_circuit() {
        let (mut cb, metrics) = breaker(3, Duration::from_secs(60), 5);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
        assert_eq!(metrics.snapshot().circuit_opened, 1);
    }

    #[test]
    fn test_open_duration_recovery() {
        let (mut cb, metrics) = breaker(1, Duration::from_millis(40), 5);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());

        std::thread::sleep(Duration::from_millis(50));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(metrics.snapshot().circuit_half_opened, 1);
    }

    #[test]
    fn test_half_open_probe_budget() {
        let (mut cb, _) = breaker(1, Duration::from_millis(10), 3);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        // The transitioning call is admitted on top of the probe budget.
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Exactly `half_open_permits` probes follow the transition.
        let admitted = (0..5).filter(|_| cb.allow()).count();
        assert_eq!(admitted, 3);
        assert!(!cb.allow());
    }

    #[test]
    fn test_half_open_success_closes() {
        let (mut cb, metrics) = breaker(1, Duration::from_millis(10), 5);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(metrics.snapshot().circuit_closed, 1);
    }

    #[test]
    fn test_half_open_failure_reopens_and_probes_reset() {
        let (mut cb, _) = breaker(1, Duration::from_millis(10), 2);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow());
        assert!(cb.allow());
        assert!(cb.allow());
        assert!(!cb.allow());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Probe counter starts over on the next half-open entry.
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow());
        assert!(cb.allow());
        assert!(!cb.allow());
    }

    #[test]
    fn test_reset_is_idempotent_from_any_state() {
        let (mut cb, _) = breaker(1, Duration::from_secs(60), 5);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow());
    }
}
