//! Retry policies for polling loops
//!
//! Both the climate sensor retry and the LoRaWAN join poll take a
//! [`RetryPolicy`] so tests can run fast and deployments can decide whether a
//! loop ever gives up. The defaults never give up.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Delay curve between attempts
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt
    Fixed { delay_ms: u64 },
    /// Delay doubles after every failed attempt, capped at `max_ms`
    Exponential { initial_ms: u64, max_ms: u64 },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, `None` retries forever
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Retry forever with a fixed delay
    pub const fn forever(delay_ms: u64) -> Self {
        Self {
            max_attempts: None,
            backoff: Backoff::Fixed { delay_ms },
        }
    }

    /// Give up after `max_attempts` attempts
    pub const fn bounded(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    /// Whether another attempt may follow after `attempts` failed ones.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts < max,
            None => true,
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = match self.backoff {
            Backoff::Fixed { delay_ms } => delay_ms,
            Backoff::Exponential { initial_ms, max_ms } => {
                let shift = attempt.saturating_sub(1).min(32);
                initial_ms.saturating_mul(1u64 << shift).min(max_ms)
            }
        };
        Duration::from_millis(millis)
    }
}
