//! Retry loop: run a closure until success, policy exhaustion, or cancellation.

use super::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CancelToken;
use crate::downloader::SegmentError;

/// Runs `f` until it succeeds or the policy says to stop. Between attempts it
/// waits out the backoff on `cancel`. Once the token trips no further attempt
/// is made and the last failure is returned as is.
pub fn run_with_retry<F>(policy: &RetryPolicy, cancel: &CancelToken, mut f: F) -> Result<(), SegmentError>
where
    F: FnMut(u32) -> Result<(), SegmentError>,
{
    let mut attempt = 1u32;
    loop {
        let err = match f(attempt) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            return Err(err);
        }
        match policy.decide(attempt, classify::classify(&err)) {
            RetryDecision::NoRetry => return Err(err),
            RetryDecision::RetryAfter(delay) => {
                tracing::debug!(attempt, ?delay, error = %err, "retrying after backoff");
                if cancel.wait_timeout(delay) {
                    return Err(err);
                }
                attempt += 1;
            }
        }
    }
}
