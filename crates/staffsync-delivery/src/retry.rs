//! Exponential backoff and dead-letter decisions.
//!
//! A failed attempt either schedules the event again after
//! `min(max_delay, base_delay * 2^(attempts - 1))` or, once the attempt
//! budget is spent, dead-letters it. Jitter is optional and never pushes a
//! delay past the cap.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for failed integration events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts after which an event is dead-lettered.
    pub max_attempts: u32,

    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Upper bound for any delay.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0). Zero keeps delays deterministic.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(crate::DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(crate::DEFAULT_MAX_DELAY_MS),
            jitter_factor: 0.0,
        }
    }
}

/// Outcome of applying the policy to a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Make the event claimable again at the given time.
    Retry {
        /// Earliest time the next attempt may run
        next_run_at: DateTime<Utc>,
    },
    /// Stop retrying.
    DeadLetter {
        /// Why the event was given up on
        reason: String,
    },
}

impl RetryPolicy {
    /// Delay before the attempt following failure number `attempts`.
    ///
    /// `attempts` is 1-based; zero is treated as one.
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let delay = self.base_delay.checked_mul(multiplier).unwrap_or(self.max_delay);
        let capped = delay.min(self.max_delay);

        apply_jitter(capped, self.jitter_factor).min(self.max_delay)
    }

    /// Decides what happens after failure number `attempts`, observed at
    /// `failed_at`.
    pub fn decide(&self, attempts: u32, failed_at: DateTime<Utc>) -> RetryDecision {
        if attempts >= self.max_attempts {
            return RetryDecision::DeadLetter {
                reason: format!("maximum attempts ({}) reached", self.max_attempts),
            };
        }

        let Ok(delay) = chrono::Duration::from_std(self.backoff_delay(attempts)) else {
            return RetryDecision::DeadLetter {
                reason: "retry delay duration out of range".to_string(),
            };
        };

        RetryDecision::Retry { next_run_at: failed_at + delay }
    }
}

/// Randomizes a delay by up to `jitter_factor` in either direction.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}
