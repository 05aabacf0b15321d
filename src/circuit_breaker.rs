//! Circuit breaker with lock-free state transitions.
//!
//! One breaker exists per operation name, shared by all concurrent callers.
//! Transitions use compare-and-swap so a concurrent failure during
//! OPEN → HALF_OPEN cannot lose the new state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::BreakerTuning;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Outcome of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPermit {
    Allowed,
    /// Circuit is open and the recovery window has not elapsed.
    Rejected { open_for: Duration },
}

/// Per-operation circuit breaker.
///
/// Closed counts consecutive failures and opens at the threshold. Open
/// rejects calls until the recovery timeout elapses, then flips to
/// half-open. Half-open closes after the configured number of consecutive
/// successes and reopens on any failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    operation: String,
    tuning: BreakerTuning,
    state: AtomicU8,
    failure_count: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_successes: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(operation: impl Into<String>, tuning: BreakerTuning) -> Self {
        Self::with_clock(operation, tuning, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(
        operation: impl Into<String>,
        tuning: BreakerTuning,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            operation: operation.into(),
            tuning,
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicUsize::new(0),
            opened_at_millis: AtomicU64::new(0),
            half_open_successes: AtomicUsize::new(0),
            clock,
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Acquire)
    }

    /// Whether a call may proceed right now. An open breaker whose recovery
    /// window has elapsed transitions to half-open here.
    pub fn check(&self) -> CallPermit {
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_CLOSED | STATE_HALF_OPEN => return CallPermit::Allowed,
                _ => {}
            }

            let opened_at = self.opened_at_millis.load(Ordering::Acquire);
            let elapsed = self.clock.now_millis().saturating_sub(opened_at);
            let recovery_millis = self.tuning.recovery_timeout_s * 1000;

            if elapsed < recovery_millis {
                return CallPermit::Rejected { open_for: Duration::from_millis(elapsed) };
            }

            match self.state.compare_exchange(
                STATE_OPEN,
                STATE_HALF_OPEN,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.half_open_successes.store(0, Ordering::Release);
                    info!(operation = %self.operation, "circuit breaker half-open");
                    return CallPermit::Allowed;
                }
                // Lost the race; re-read the state.
                Err(_) => continue,
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        match self.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.tuning.half_open_max_calls
                    && self
                        .state
                        .compare_exchange(
                            STATE_HALF_OPEN,
                            STATE_CLOSED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.failure_count.store(0, Ordering::Release);
                    self.opened_at_millis.store(0, Ordering::Release);
                    info!(operation = %self.operation, "circuit breaker closed");
                }
            }
            STATE_CLOSED => {
                self.failure_count.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    /// Record a failed call. Returns `true` when the breaker is open after
    /// this failure.
    pub fn record_failure(&self) -> bool {
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        match self.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                if self
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                    warn!(operation = %self.operation, "circuit breaker reopened after failed probe");
                }
                true
            }
            STATE_CLOSED => {
                if failures >= self.tuning.failure_threshold {
                    if self
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                        warn!(
                            operation = %self.operation,
                            failures,
                            threshold = self.tuning.failure_threshold,
                            "circuit breaker opened"
                        );
                    }
                    true
                } else {
                    false
                }
            }
            _ => true,
        }
    }

    /// Force the breaker back to closed, clearing all counters.
    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.opened_at_millis.store(0, Ordering::Release);
        self.half_open_successes.store(0, Ordering::Release);
    }
}

/// Process-wide registry of breakers, partitioned by operation name.
#[derive(Debug, Default, Clone)]
pub struct BreakerRegistry {
    inner: Arc<Mutex<HashMap<String, Arc<CircuitBreaker>>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the breaker for an operation, creating it with the supplied
    /// tuning and clock on first use.
    pub fn breaker_for(
        &self,
        operation: &str,
        tuning: BreakerTuning,
        clock: Arc<dyn Clock>,
    ) -> Arc<CircuitBreaker> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.entry(operation.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::with_clock(operation, tuning, clock)))
            .clone()
    }

    pub fn get(&self, operation: &str) -> Option<Arc<CircuitBreaker>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).get(operation).cloned()
    }

    /// Force one operation's breaker back to closed. Returns `false` when
    /// the operation has no breaker yet.
    pub fn reset(&self, operation: &str) -> bool {
        match self.get(operation) {
            Some(breaker) => {
                breaker.reset();
                info!(operation, "circuit breaker reset");
                true
            }
            None => false,
        }
    }

    /// Sorted snapshot of breaker states, for health reporting.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries: Vec<(String, CircuitState)> =
            map.iter().map(|(name, b)| (name.clone(), b.state())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of breakers currently open.
    pub fn open_count(&self) -> usize {
        self.snapshot().iter().filter(|(_, s)| *s == CircuitState::Open).count()
    }
}
