use std::time::Duration;

use crate::config::RetryConfig;

/// What kind of failure a segment hit, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    /// 429 or 503.
    Throttled,
    /// Refused, reset, unresolvable host and other transport trouble.
    Connection,
    /// Any other server error.
    Http5xx(u16),
    /// Permanent as far as this job is concerned.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Doubling backoff for failed segments, capped at `max_delay`.
/// `[downloader.retry]` converts into one with `From<&RetryConfig>`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per segment, the first one included.
    pub max_attempts: u32,
    /// Wait after the first failure.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs_f64(cfg.max_delay_secs.max(0.0)),
        }
    }
}

impl RetryPolicy {
    /// One attempt, never retried.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// After failed attempt number `attempt` (counting from 1), either give up
    /// or wait `base_delay * 2^(attempt - 1)`, never more than `max_delay`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || kind == ErrorKind::Other {
            return RetryDecision::NoRetry;
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        RetryDecision::RetryAfter(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}
