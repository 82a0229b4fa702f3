//! Job control: a shared cancel token and the handle callers keep while a job runs.
//!
//! `DownloadJob::control()` hands out a [`JobControl`]. Cancelling trips the
//! token every segment worker observes from its curl progress callback and
//! from retry backoff waits; the run then ends with `DownloadError::Cancelled`
//! carrying the record `DownloadJob::resume` needs. A request made while the
//! job is idle applies to its next run. The job clears the token when a run
//! ends, so the same job can be resumed afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::downloader::{JobProgress, JobState, ProgressStats};

/// Cloneable cancellation flag shared by a job and its segment workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a consumed cancel request.
    pub(crate) fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Sleep up to `timeout`, waking early on cancel. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (_guard, _) = self
            .inner
            .cond
            .wait_timeout_while(guard, timeout, |_| !self.is_cancelled())
            .unwrap_or_else(PoisonError::into_inner);
        self.is_cancelled()
    }
}

/// Handle to a running (or finished) download job.
#[derive(Debug, Clone)]
pub struct JobControl {
    cancel: CancelToken,
    progress: Arc<JobProgress>,
}

impl JobControl {
    pub(crate) fn new(cancel: CancelToken, progress: Arc<JobProgress>) -> Self {
        Self { cancel, progress }
    }

    /// Request cancellation. In-flight segments abort at their next progress tick.
    pub fn cancel(&self) {
        tracing::info!("cancellation requested");
        self.cancel.cancel();
    }

    /// A cancel request is pending or in effect for the current run.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> JobState {
        self.progress.state()
    }

    pub fn progress(&self) -> ProgressStats {
        self.progress.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_times_out_without_cancel() {
        let t = CancelToken::new();
        let started = Instant::now();
        assert!(!t.wait_timeout(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_wakes_waiter() {
        let t = CancelToken::new();
        let other = t.clone();
        let started = Instant::now();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(20));
                other.cancel();
            });
            assert!(t.wait_timeout(Duration::from_secs(30)));
        });
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(t.is_cancelled());
    }

    #[test]
    fn already_cancelled_returns_immediately() {
        let t = CancelToken::new();
        t.cancel();
        t.cancel();
        assert!(t.wait_timeout(Duration::from_secs(30)));
    }

    #[test]
    fn control_shares_token_and_progress() {
        let token = CancelToken::new();
        let progress = Arc::new(JobProgress::new());
        let c = JobControl::new(token.clone(), Arc::clone(&progress));
        assert_eq!(c.state(), JobState::Init);
        progress.set_state(JobState::Downloading);
        assert_eq!(c.clone().state(), JobState::Downloading);
        c.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn reset_rearms_token_for_the_next_wait() {
        let t = CancelToken::new();
        let shared = t.clone();
        t.cancel();
        assert!(shared.wait_timeout(Duration::from_secs(30)));
        t.reset();
        assert!(!shared.is_cancelled());
        assert!(!shared.wait_timeout(Duration::from_millis(10)));
        shared.cancel();
        assert!(t.is_cancelled());
    }
}
