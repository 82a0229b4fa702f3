//! Download errors: per-segment causes and the job-level outcome.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::fetch_head::ProbeError;
use crate::segmenter::Segment;

/// Why one segment did not complete.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// Transport failure reported by curl (connect, DNS, reset, ...).
    #[error("curl: {0}")]
    Curl(curl::Error),
    /// Non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Server answered a ranged request with something other than the requested range.
    #[error("invalid range response: {detail}")]
    InvalidRangeResponse { detail: String },
    /// Transfer ended with a byte count different from the segment length.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// The per-request timeout expired.
    #[error("segment timed out")]
    TimedOut,
    /// No worker thread could be started for the segment.
    #[error("could not start worker: {0}")]
    Spawn(#[source] io::Error),
    /// Local write into the `.part` file failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("cancelled")]
    Cancelled,
}

/// A failed segment and its cause.
#[derive(Debug, thiserror::Error)]
#[error("segment {index} [{}..{}): {cause}", .segment.start, .segment.end)]
pub struct SegmentFailed {
    pub index: usize,
    pub segment: Segment,
    #[source]
    pub cause: SegmentError,
}

/// Everything needed to report, and later resume, a download whose segments
/// did not all complete. The `.part` file at `partial_path` keeps the bytes of
/// every segment that did.
#[derive(Debug)]
pub struct FailedDownload {
    pub url: String,
    pub dest: PathBuf,
    pub partial_path: PathBuf,
    pub total_len: u64,
    /// Full segment plan of the run.
    pub segments: Vec<Segment>,
    /// Failed segments, ordered by index.
    pub failures: Vec<SegmentFailed>,
    /// Whether segments were fetched with byte ranges.
    pub ranged: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl FailedDownload {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

impl fmt::Display for FailedDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} segments failed (partial file kept at {})",
            self.failures.len(),
            self.segments.len(),
            self.partial_path.display()
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("probe of {url} failed: {source}")]
    ProbeFailed {
        url: String,
        #[source]
        source: ProbeError,
    },
    #[error("download failed: {0}")]
    Failed(FailedDownload),
    #[error("size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("write to {} failed: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("SHA-256 mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("remote resource changed since the partial download: {detail}")]
    RemoteChanged { detail: String },
    #[error("resume does not match this job: {0}")]
    ResumeMismatch(String),
    /// Cancelled after segments started. Unfinished segments are listed as
    /// failures, cancelled ones with [`SegmentError::Cancelled`].
    #[error("download cancelled: {0}")]
    Cancelled(FailedDownload),
    #[error("download worker failed: {0}")]
    Worker(String),
}

impl DownloadError {
    /// The resumable record, if segments failed or were cancelled.
    pub fn as_failed(&self) -> Option<&FailedDownload> {
        match self {
            DownloadError::Failed(f) | DownloadError::Cancelled(f) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DownloadError::WriteFailed {
            path: path.into(),
            source,
        }
    }
}
