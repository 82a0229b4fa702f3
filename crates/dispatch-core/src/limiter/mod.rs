//! Live-reconfigurable admission limiter.
//!
//! Token bucket: `limit` permits per `interval`, starting full. [`RateLimiter::take`]
//! never blocks; a denial ([`RateExceeded`]) is a normal outcome and callers
//! decide their own backoff. [`RateLimiter::set_limit`] swaps interval and limit
//! together under the same lock as the token math, so no caller ever sees a
//! mixed configuration.
//!
//! Reconfiguration rule: time elapsed up to the switch is credited at the old
//! rate, `available` is then capped to the new limit, and accrual restarts from
//! the moment of the switch. A reconfiguration never grants tokens.
//!
//! Windows aligned to refills admit at most `limit`. A sliding window of
//! length `t` can admit up to `limit + floor(t * limit / interval)`: a full
//! bucket drained at its start plus whatever accrues inside it.

mod bucket;
mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bucket::Bucket;

/// Denied admission. Expected and frequent; not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate exceeded; next permit in {retry_after:?}")]
pub struct RateExceeded {
    /// Time until the next whole token accrues under the current configuration.
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    #[error("rate limiter interval must be non-zero")]
    ZeroInterval,
}

/// Token-bucket admission gate shared by any number of threads.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    clock: C,
    bucket: Mutex<Bucket>,
}

impl RateLimiter<SystemClock> {
    /// `limit` permits per `interval` on the system monotonic clock.
    pub fn new(interval: Duration, limit: u64) -> Result<Self, LimiterError> {
        Self::with_clock(interval, limit, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(interval: Duration, limit: u64, clock: C) -> Result<Self, LimiterError> {
        if interval.is_zero() {
            return Err(LimiterError::ZeroInterval);
        }
        let now = clock.now();
        Ok(Self {
            bucket: Mutex::new(Bucket::new(interval, limit, now)),
            clock,
        })
    }

    /// Consume one permit, or fail immediately.
    pub fn take(&self) -> Result<(), RateExceeded> {
        let mut bucket = self.lock();
        let now = self.clock.now();
        bucket
            .try_take(now)
            .map_err(|retry_after| RateExceeded { retry_after })
    }

    /// Replace interval and limit atomically. See the module docs for how
    /// partially consumed tokens carry over.
    pub fn set_limit(&self, interval: Duration, limit: u64) -> Result<(), LimiterError> {
        if interval.is_zero() {
            tracing::warn!(limit, "rejected rate limiter reconfiguration with zero interval");
            return Err(LimiterError::ZeroInterval);
        }
        let mut bucket = self.lock();
        let now = self.clock.now();
        let (old_interval, old_limit) = (bucket.interval, bucket.limit);
        bucket.reconfigure(interval, limit, now);
        tracing::info!(
            ?old_interval,
            old_limit,
            ?interval,
            limit,
            available = bucket.available,
            "rate limiter reconfigured"
        );
        Ok(())
    }

    /// Permits currently available (after crediting elapsed time).
    pub fn available(&self) -> u64 {
        let mut bucket = self.lock();
        let now = self.clock.now();
        bucket.refill(now);
        bucket.available
    }

    /// Current `(interval, limit)` pair.
    pub fn config(&self) -> (Duration, u64) {
        let bucket = self.lock();
        (bucket.interval, bucket.limit)
    }

    // The clock is read while holding the lock so `last_refill` never moves backwards.
    // Bucket state is plain integers and stays consistent even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests;
