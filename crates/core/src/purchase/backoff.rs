//! Delay between failed iterations.
//!
//! Retrying instantly and retrying after a cooldown are both configurations
//! of [`BackoffPolicy`]; the loop itself never changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long to wait before the next iteration after a retry.
///
/// TOML: `backoff = { kind = "fixed", delay_ms = 10000 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Retry immediately.
    #[default]
    None,
    /// Same delay after every failure.
    Fixed { delay_ms: u64 },
    /// `initial_ms * multiplier^retry`, capped at `max_ms`.
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
}

fn default_multiplier() -> f64 {
    2.0
}

impl BackoffPolicy {
    /// Delay used by the hosted service unless configured otherwise.
    pub const SERVICE_DEFAULT: Self = Self::Fixed { delay_ms: 10_000 };

    /// Delay before the iteration following the `retry`-th consecutive failure (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential {
                initial_ms,
                max_ms,
                multiplier,
            } => {
                let factor = multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
                let delay_ms = (initial_ms as f64 * factor).min(max_ms as f64);
                Duration::from_millis(delay_ms as u64)
            }
        }
    }
}
