//! Backoff between retries of failed work.
//!
//! A [`RetryPolicy`] only proposes a delay. Whether another attempt happens
//! at all is decided by the scheduler from the task's `max_retries`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// `min(base * multiplier^retry_count, cap)`.
    ExponentialBackoff {
        base: Duration,
        multiplier: f64,
        cap: Duration,
    },
    /// Same delay for every retry.
    FixedDelay(Duration),
}

impl RetryPolicy {
    pub fn exponential(base: Duration, multiplier: f64, cap: Duration) -> Self {
        Self::ExponentialBackoff {
            base,
            multiplier,
            cap,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::FixedDelay(delay)
    }

    /// Delay before the retry that follows `retry_count` earlier retries.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        match self {
            Self::FixedDelay(delay) => *delay,
            Self::ExponentialBackoff {
                base,
                multiplier,
                cap,
            } => {
                let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
                let delay_ms = base.as_millis() as f64 * multiplier.powi(exponent);
                let cap_ms = cap.as_millis() as f64;
                if delay_ms.is_finite() && delay_ms < cap_ms {
                    Duration::from_millis(delay_ms as u64)
                } else {
                    *cap
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), 2.0, Duration::from_secs(60))
    }
}
