//! Resilience orchestrator: retry, circuit breaking, and per-attempt
//! timeouts applied around any async call, keyed by operation name.
//!
//! Strategy selection is runtime data, not code structure: callers pass the
//! operation name and the orchestrator looks up the strategy, so the same
//! handle serves every operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::backoff::ExponentialBackoff;
use crate::circuit_breaker::{BreakerRegistry, CallPermit, CircuitState};
use crate::clock::{Clock, MonotonicClock};
use crate::config::ResilienceSettings;
use crate::error::ServiceError;
use crate::jitter::Jitter;
use crate::presets::{StrategyKind, StrategyParams};
use crate::sleeper::{Sleeper, TokioSleeper};

/// Shared resilience handle. Construct once at startup and pass by
/// reference; breaker state is partitioned per operation and survives for
/// the life of the process.
#[derive(Debug)]
pub struct Resilience {
    settings: ResilienceSettings,
    breakers: BreakerRegistry,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl Resilience {
    pub fn new(settings: ResilienceSettings) -> Self {
        Self {
            settings,
            breakers: BreakerRegistry::new(),
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Swap the sleeper; tests use this to run retry schedules instantly.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Swap the clock driving breaker recovery windows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &ResilienceSettings {
        &self.settings
    }

    /// Concrete parameters for an operation. The preset's own tuning covers
    /// operations running the default strategy; a differing strategy tag
    /// resolves to its built-in bundle.
    pub fn params_for(&self, operation: &str) -> StrategyParams {
        let kind = self.settings.strategy_for(operation);
        if kind == self.settings.default_strategy {
            let builtin = StrategyParams::for_kind(kind);
            StrategyParams {
                retry: self.settings.retry,
                breaker: self.settings.breaker,
                attempt_timeout: builtin.attempt_timeout,
            }
        } else {
            StrategyParams::for_kind(kind)
        }
    }

    pub fn strategy_for(&self, operation: &str) -> StrategyKind {
        self.settings.strategy_for(operation)
    }

    /// Breaker states for all operations seen so far, for health reporting.
    pub fn breaker_snapshot(&self) -> Vec<(String, CircuitState)> {
        self.breakers.snapshot()
    }

    pub fn open_breaker_count(&self) -> usize {
        self.breakers.open_count()
    }

    /// Force an operation's circuit breaker back to closed; admin tooling
    /// calls this after an upstream incident is resolved rather than
    /// waiting out the recovery window. Returns `false` when the operation
    /// has no breaker yet.
    pub fn reset_breaker(&self, operation: &str) -> bool {
        self.breakers.reset(operation)
    }

    /// Execute `call` under the operation's strategy.
    ///
    /// Attempts are strictly sequential within one invocation. Concurrent
    /// invocations share the operation's breaker. Dropping the returned
    /// future abandons the current attempt at its next suspension point
    /// without touching breaker accounting.
    ///
    /// # Errors
    ///
    /// Non-retryable errors propagate unchanged after the first attempt.
    /// Retryable errors surface as `ServiceError::ServiceUnavailable` once
    /// the circuit opens or attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if !self.settings.resilience_enabled {
            return call().await;
        }

        let params = self.params_for(operation);
        let breaker_enabled = self.settings.circuit_breaker_enabled;
        let breaker =
            self.breakers.breaker_for(operation, params.breaker, self.clock.clone());

        if breaker_enabled {
            if let CallPermit::Rejected { open_for } = breaker.check() {
                return Err(ServiceError::unavailable("circuit breaker is open")
                    .with_context("operation", operation)
                    .with_context("open_for_ms", open_for.as_millis() as u64));
            }
        }

        let max_attempts =
            if self.settings.retry_enabled { params.retry.max_attempts.max(1) } else { 1 };
        let backoff = ExponentialBackoff::new(
            Duration::from_secs_f64(params.retry.exp_min),
            Duration::from_secs_f64(params.retry.exp_max),
            params.retry.exp_multiplier,
        );
        let jitter = if params.retry.jitter_enabled {
            Jitter::additive(Duration::from_secs_f64(params.retry.jitter_max_s))
        } else {
            Jitter::None
        };
        let backoff_budget = Duration::from_secs(params.retry.max_delay_s);
        let mut total_backoff = Duration::ZERO;
        let mut last_error: Option<ServiceError> = None;

        for attempt in 1..=max_attempts {
            let outcome = tokio::time::timeout(params.attempt_timeout, call()).await;
            let result = match outcome {
                Ok(result) => result,
                Err(_) => Err(ServiceError::transient("attempt timed out")
                    .with_context("operation", operation)
                    .with_context("timeout_ms", params.attempt_timeout.as_millis() as u64)),
            };

            match result {
                Ok(value) => {
                    if breaker_enabled {
                        breaker.record_success();
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    // Permanent failures still count toward the breaker but
                    // are never converted or retried.
                    if breaker_enabled {
                        breaker.record_failure();
                    }
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        error = %error,
                        "retryable failure"
                    );
                    if breaker_enabled && breaker.record_failure() {
                        return Err(ServiceError::unavailable("circuit breaker opened")
                            .with_context("operation", operation)
                            .with_context("last_error", error.to_string()));
                    }

                    if attempt < max_attempts {
                        let mut delay = jitter.apply(backoff.delay(attempt));
                        if let ServiceError::RateLimit { retry_after_s: Some(hint), .. } = &error
                        {
                            delay = delay.max(Duration::from_secs(*hint));
                        }
                        if total_backoff + delay > backoff_budget {
                            warn!(operation, attempt, "retry backoff budget exhausted");
                            last_error = Some(error);
                            break;
                        }
                        warn!(
                            operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "backing off before retry"
                        );
                        self.sleeper.sleep(delay).await;
                        total_backoff += delay;
                    }
                    last_error = Some(error);
                }
            }
        }

        let mut err = ServiceError::unavailable("retries exhausted")
            .with_context("operation", operation)
            .with_context("attempts", max_attempts);
        if let Some(last) = last_error {
            err = err.with_context("last_error", last.to_string());
        }
        Err(err)
    }
}
