//! Per-segment retry with exponential backoff.
//!
//! Failures are classified into coarse kinds (timeouts, throttling, connection
//! failures, 5xx) and the policy decides whether and how long to wait. Backoff
//! waits observe the job's cancel token.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
