//! Live job progress: state machine position and per-segment byte counters.
//!
//! Segment threads bump their own `AtomicU64`; readers take a [`ProgressStats`]
//! snapshot and derive rate and ETA from it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::segmenter::Segment;

/// Where a job is in `Init -> Probing -> Downloading -> Assembling -> Done | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Init = 0,
    Probing = 1,
    Downloading = 2,
    Assembling = 3,
    Done = 4,
    Failed = 5,
}

impl JobState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => JobState::Init,
            1 => JobState::Probing,
            2 => JobState::Downloading,
            3 => JobState::Assembling,
            4 => JobState::Done,
            _ => JobState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Init => "init",
            JobState::Probing => "probing",
            JobState::Downloading => "downloading",
            JobState::Assembling => "assembling",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Byte counter owned by one segment.
#[derive(Debug)]
pub(crate) struct SegmentCounter {
    len: u64,
    transferred: AtomicU64,
    done: AtomicBool,
}

impl SegmentCounter {
    fn new(len: u64) -> Self {
        Self {
            len,
            transferred: AtomicU64::new(0),
            done: AtomicBool::new(false),
        }
    }

    pub(crate) fn add(&self, n: u64) {
        self.transferred.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Start of a fresh attempt: forget bytes from a previous one.
    pub(crate) fn reset(&self) {
        self.transferred.store(0, Ordering::Relaxed);
        self.done.store(false, Ordering::Release);
    }

    pub(crate) fn mark_done(&self) {
        self.transferred.store(self.len, Ordering::Relaxed);
        self.done.store(true, Ordering::Release);
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Shared progress state of one job.
#[derive(Debug)]
pub struct JobProgress {
    state: AtomicU8,
    total_bytes: AtomicU64,
    started: Mutex<Option<Instant>>,
    finished: Mutex<Option<Instant>>,
    segments: RwLock<Arc<Vec<SegmentCounter>>>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProgress {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(JobState::Init as u8),
            total_bytes: AtomicU64::new(0),
            started: Mutex::new(None),
            finished: Mutex::new(None),
            segments: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: JobState) {
        let prev = JobState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        let now = Instant::now();
        match state {
            JobState::Probing => {
                *self.started.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
                *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = None;
            }
            JobState::Done | JobState::Failed => {
                *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
            }
            _ => {}
        }
        if prev != state {
            tracing::info!(from = %prev, to = %state, "job state");
        }
    }

    /// Install fresh counters for `segments`; returns them for the workers.
    pub(crate) fn install(&self, total_bytes: u64, segments: &[Segment]) -> Arc<Vec<SegmentCounter>> {
        let counters = Arc::new(segments.iter().map(|s| SegmentCounter::new(s.len())).collect::<Vec<_>>());
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
        *self.segments.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&counters);
        counters
    }

    pub fn snapshot(&self) -> ProgressStats {
        let counters = Arc::clone(&self.segments.read().unwrap_or_else(PoisonError::into_inner));
        let started = *self.started.lock().unwrap_or_else(PoisonError::into_inner);
        let finished = *self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = match (started, finished) {
            (Some(s), Some(f)) => f.saturating_duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::ZERO,
        };
        ProgressStats {
            state: self.state(),
            bytes_done: counters.iter().map(SegmentCounter::transferred).sum(),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            elapsed,
            segments_done: counters.iter().filter(|c| c.is_done()).count(),
            segment_count: counters.len(),
        }
    }
}

/// Point-in-time view of a job's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStats {
    pub state: JobState,
    /// Bytes written so far across all segments.
    pub bytes_done: u64,
    pub total_bytes: u64,
    /// Since probing started; frozen once the job is terminal.
    pub elapsed: Duration,
    pub segments_done: usize,
    pub segment_count: usize,
}

impl ProgressStats {
    /// Average rate in bytes per second (0 if no time has passed).
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / secs
    }

    /// Estimated time remaining (None while the rate is still 0).
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.state == JobState::Done { 1.0 } else { 0.0 };
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}
