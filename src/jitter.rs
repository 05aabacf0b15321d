//! Additive jitter applied on top of backoff delays.

use rand::Rng;
use std::time::Duration;

/// Jitter strategy for retry delays. The spread is added to the base delay,
/// so the slept duration is `delay + uniform(0, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Deterministic delays; used when jitter is disabled in config.
    None,
    /// Add a uniform random duration in `[0, max]`.
    Additive { max: Duration },
}

impl Jitter {
    pub fn additive(max: Duration) -> Self {
        Jitter::Additive { max }
    }

    /// Apply jitter using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rand::rng())
    }

    /// Apply jitter with a caller-provided RNG; seeded RNGs make retry
    /// schedules reproducible in tests.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Additive { max } => {
                let spread = max.as_millis() as u64;
                if spread == 0 {
                    return delay;
                }
                delay + Duration::from_millis(rng.random_range(0..=spread))
            }
        }
    }
}
