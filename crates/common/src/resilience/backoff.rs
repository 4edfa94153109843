//! Exponential backoff with equal jitter
//!
//! The delay for attempt `n` is drawn uniformly from `[base/2, base]` where
//! `base = min(initial * 2^(n-1), max)`. Jitter keeps many clients that
//! failed together from retrying together.

use std::time::Duration;

use rand::Rng;

use crate::error::{CommonError, CommonResult};

/// Exponent cap so `2^(attempt-1)` cannot overflow.
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Floor applied to the jittered lower bound; never raises it above the ceiling.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Pure delay calculator shared by HTTP retries and live resubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Create a policy. An `initial` above `max` is clamped to `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial: initial.min(max), max }
    }

    /// Create a policy, rejecting an `initial` delay above `max`.
    ///
    /// # Errors
    /// Returns `CommonError::Config` when `initial > max`.
    pub fn try_new(initial: Duration, max: Duration) -> CommonResult<Self> {
        if initial > max {
            return Err(CommonError::config_field(
                "initial_delay",
                format!("initial delay {initial:?} exceeds max delay {max:?}"),
            ));
        }
        Ok(Self { initial, max })
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Un-jittered delay for `attempt` (1-based; 0 behaves like 1).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.initial.checked_mul(1_u32 << exponent).map_or(self.max, |delay| delay.min(self.max))
    }

    /// Jittered delay for `attempt` using the thread-local RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Jittered delay for `attempt` drawn from `rng`.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.ceiling(attempt);
        let lower = (base / 2).max(MIN_DELAY).min(base);
        if lower >= base {
            return base;
        }
        Duration::from_nanos(rng.gen_range(as_nanos(lower)..=as_nanos(base)))
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
