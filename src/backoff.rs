//! Exponential backoff used between retry attempts.

use std::time::Duration;

/// Exponential delay schedule: `min * multiplier^(attempt-1)`, capped at
/// `max`. Attempts are 1-indexed; attempt 1 yields `min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    /// Build a schedule. `multiplier` below 1.0 is clamped to 1.0 so the
    /// sequence never shrinks; `max` below `min` is raised to `min`.
    pub fn new(min: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            min,
            max: max.max(min),
            multiplier: if multiplier < 1.0 { 1.0 } else { multiplier },
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Delay to sleep before the given retry attempt (1-indexed).
    pub fn delay(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.multiplier.powi(exponent);
        let secs = self.min.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}
