//! Exponential backoff with additive jitter
//!
//! The policy only answers "how long to wait before attempt N"; callers own
//! the attempt budget.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    /// `multiplier` below 1.0 is clamped to 1.0 so delays never shrink
    pub fn new(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base: base.min(max),
            multiplier: if multiplier.is_finite() {
                multiplier.max(1.0)
            } else {
                1.0
            },
            max,
        }
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }

    /// Delay before retry `attempt` (0-indexed), without jitter
    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let nanos = self.base.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !nanos.is_finite() || nanos >= self.max.as_nanos() as f64 {
            self.max
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// `min(base * multiplier^attempt, max)` plus uniform jitter in `[0, that]`,
    /// capped at `max`. Deterministic for a seeded `rng`.
    pub fn next_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.base_delay(attempt);
        let jitter = delay.mul_f64(rng.random_range(0.0..=1.0));
        (delay + jitter).min(self.max)
    }
}
