//! Token arithmetic. Pure state, no locking; `RateLimiter` owns the mutex.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub(super) struct Bucket {
    pub(super) interval: Duration,
    pub(super) limit: u64,
    pub(super) available: u64,
    pub(super) last_refill: Instant,
}

impl Bucket {
    /// Starts full.
    pub(super) fn new(interval: Duration, limit: u64, now: Instant) -> Self {
        Self {
            interval,
            limit,
            available: limit,
            last_refill: now,
        }
    }

    /// Credit whole tokens earned since `last_refill`. Fractional accrual is
    /// carried forward until it makes a whole token, and dropped once the
    /// bucket is full.
    pub(super) fn refill(&mut self, now: Instant) {
        if self.available >= self.limit {
            self.available = self.limit;
            self.last_refill = now;
            return;
        }
        let interval_ns = self.interval.as_nanos();
        let elapsed_ns = now.saturating_duration_since(self.last_refill).as_nanos();
        let earned = elapsed_ns * u128::from(self.limit) / interval_ns;
        if earned == 0 {
            return;
        }
        let missing = u128::from(self.limit - self.available);
        if earned >= missing {
            self.available = self.limit;
            self.last_refill = now;
            return;
        }
        // earned < missing <= limit, fits in u64.
        self.available += earned as u64;
        // Rounded up so the carried remainder can never over-grant. Bounded by elapsed_ns.
        let consumed_ns = (earned * interval_ns).div_ceil(u128::from(self.limit));
        self.last_refill += Duration::from_nanos(u64::try_from(consumed_ns).unwrap_or(u64::MAX));
    }

    /// Consume one token if available.
    pub(super) fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.available > 0 {
            self.available -= 1;
            Ok(())
        } else {
            Err(self.time_to_next_token(now))
        }
    }

    /// Time until `refill` would credit at least one token.
    pub(super) fn time_to_next_token(&self, now: Instant) -> Duration {
        if self.limit == 0 {
            return self.interval;
        }
        let per_token_ns = self.interval.as_nanos().div_ceil(u128::from(self.limit));
        let elapsed_ns = now.saturating_duration_since(self.last_refill).as_nanos();
        let wait = per_token_ns.saturating_sub(elapsed_ns);
        Duration::from_nanos(u64::try_from(wait).unwrap_or(u64::MAX))
    }

    /// Install a new configuration. Time elapsed so far is credited at the old
    /// rate, then `available` is capped to the new limit and accrual restarts
    /// from `now`. Never grants tokens.
    pub(super) fn reconfigure(&mut self, interval: Duration, limit: u64, now: Instant) {
        self.refill(now);
        self.interval = interval;
        self.limit = limit;
        self.available = self.available.min(limit);
        self.last_refill = now;
    }
}
