//! Segmented downloader.
//!
//! A [`DownloadJob`] probes the resource, splits `[0, length)` into contiguous
//! segments, fetches each on its own thread with a byte-range GET written
//! straight into `<dest>.part`, then syncs, verifies, and renames the file into
//! place. Segment failures are collected, never short-circuited: the job ends
//! with every failing index in a [`FailedDownload`] that [`DownloadJob::resume`]
//! can pick up again.

mod error;
mod options;
mod progress;
mod run;
mod segment;

pub use error::{DownloadError, FailedDownload, SegmentError, SegmentFailed};
pub use options::CurlOptions;
pub(crate) use options::set_custom_headers;
pub use progress::{JobProgress, JobState, ProgressStats};

pub use crate::fetch_head::{probe, ProbeError, ProbeResult};
pub use crate::segmenter::{plan_segments, Segment};

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::checksum;
use crate::config::DownloaderConfig;
use crate::control::{CancelToken, JobControl};
use crate::retry::RetryPolicy;
use crate::storage::{self, PartFile, PartFileBuilder};
use segment::SegmentRequest;

/// What a completed job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub segments: usize,
    /// Fetched with byte ranges (false: single plain GET).
    pub ranged: bool,
    pub elapsed: Duration,
}

/// One file to fetch. Configure with the builder methods, then [`run`](Self::run).
#[derive(Debug)]
pub struct DownloadJob {
    url: String,
    dest: PathBuf,
    concurrency: usize,
    curl: CurlOptions,
    headers: HashMap<String, String>,
    retry: RetryPolicy,
    expected_sha256: Option<String>,
    cancel: CancelToken,
    progress: Arc<JobProgress>,
}

impl DownloadJob {
    /// Job for `url` (http or https) written to `dest`.
    pub fn new(url: &str, dest: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let parsed = url::Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }
        Ok(Self {
            url: url.to_string(),
            dest: dest.into(),
            concurrency: 4,
            curl: CurlOptions::default(),
            headers: HashMap::new(),
            retry: RetryPolicy::none(),
            expected_sha256: None,
            cancel: CancelToken::new(),
            progress: Arc::new(JobProgress::new()),
        })
    }

    /// Job with concurrency, timeouts and retry taken from `[downloader]`.
    pub fn from_config(
        url: &str,
        dest: impl Into<PathBuf>,
        cfg: &DownloaderConfig,
    ) -> Result<Self, DownloadError> {
        let curl = CurlOptions {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            timeout: Duration::from_secs(cfg.per_request_timeout_secs),
            low_speed_limit: cfg.low_speed_limit_bytes,
            low_speed_time: Duration::from_secs(cfg.low_speed_time_secs),
            ..CurlOptions::default()
        };
        let job = Self::new(url, dest)?
            .concurrency(cfg.concurrency)
            .curl_options(curl);
        Ok(match &cfg.retry {
            Some(retry) => job.retry_policy(RetryPolicy::from(retry)),
            None => job,
        })
    }

    /// Segments fetched in parallel. 0 is treated as 1.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Bound on one segment's whole transfer.
    pub fn per_request_timeout(mut self, timeout: Duration) -> Self {
        self.curl.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.curl.connect_timeout = timeout;
        self
    }

    /// Replace every transfer option at once.
    pub fn curl_options(mut self, opts: CurlOptions) -> Self {
        self.curl = opts;
        self
    }

    /// Extra request header sent with the probe and every segment.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Verify the assembled file against this hex digest before renaming it into place.
    pub fn expected_sha256(mut self, hex_digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(hex_digest.into().to_ascii_lowercase());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// `<dest>.part`.
    pub fn partial_path(&self) -> PathBuf {
        storage::temp_path(&self.dest)
    }

    /// Handle for cancelling and watching this job from other threads.
    pub fn control(&self) -> JobControl {
        JobControl::new(self.cancel.clone(), Arc::clone(&self.progress))
    }

    /// Run the job to completion on the calling thread.
    pub fn run(&self) -> Result<DownloadReport, DownloadError> {
        let started = Instant::now();
        self.progress.set_state(JobState::Init);
        let result = self.run_fresh(started);
        self.finish(result)
    }

    /// [`run`](Self::run) on tokio's blocking pool.
    pub async fn run_async(self) -> Result<DownloadReport, DownloadError> {
        tokio::task::spawn_blocking(move || self.run())
            .await
            .map_err(|e| DownloadError::Worker(e.to_string()))?
    }

    /// Re-fetch only the segments `failure` lists, into the partial file it
    /// preserved. The resource is probed again first and must still have the
    /// same length, ETag and Last-Modified.
    pub fn resume(&self, failure: &FailedDownload) -> Result<DownloadReport, DownloadError> {
        let started = Instant::now();
        self.progress.set_state(JobState::Init);
        let result = self.run_resume(failure, started);
        self.finish(result)
    }

    fn finish(&self, result: Result<DownloadReport, DownloadError>) -> Result<DownloadReport, DownloadError> {
        // A cancel request is consumed by the run it ended.
        self.cancel.reset();
        match &result {
            Ok(report) => {
                self.progress.set_state(JobState::Done);
                tracing::info!(
                    url = %self.url,
                    path = %report.path.display(),
                    bytes = report.bytes,
                    segments = report.segments,
                    elapsed = ?report.elapsed,
                    "download complete"
                );
            }
            Err(e) => {
                self.progress.set_state(JobState::Failed);
                tracing::warn!(url = %self.url, error = %e, "download failed");
            }
        }
        result
    }

    fn run_fresh(&self, started: Instant) -> Result<DownloadReport, DownloadError> {
        let temp = self.partial_path();
        let mut builder = PartFileBuilder::create(&temp).map_err(|e| DownloadError::write(&temp, e))?;

        self.progress.set_state(JobState::Probing);
        let probed = match probe(&self.url, &self.headers, &self.curl.for_probe()) {
            Ok(p) => p,
            Err(source) => {
                let _ = fs::remove_file(&temp);
                return Err(DownloadError::ProbeFailed {
                    url: self.url.clone(),
                    source,
                });
            }
        };
        let total = probed.content_length.unwrap_or(0);
        let ranged = probed.accept_ranges && total > 0;
        let segments = plan_segments(total, if ranged { self.concurrency } else { 1 });
        tracing::info!(
            url = %self.url,
            total,
            ranged,
            segments = segments.len(),
            etag = probed.etag.as_deref().unwrap_or(""),
            "probed"
        );

        builder.preallocate(total).map_err(|e| DownloadError::write(&temp, e))?;
        let part = builder.build();
        let work: Vec<(usize, Segment)> = segments.iter().copied().enumerate().collect();
        self.download(part, &segments, &work, ranged, total, &probed, started)
    }

    fn run_resume(&self, failure: &FailedDownload, started: Instant) -> Result<DownloadReport, DownloadError> {
        if failure.url != self.url || failure.dest != self.dest {
            return Err(DownloadError::ResumeMismatch(format!(
                "record is for {} -> {}",
                failure.url,
                failure.dest.display()
            )));
        }
        let part = PartFile::open_existing(&failure.partial_path)
            .map_err(|e| DownloadError::write(&failure.partial_path, e))?;

        self.progress.set_state(JobState::Probing);
        let probed = probe(&self.url, &self.headers, &self.curl.for_probe()).map_err(|source| {
            DownloadError::ProbeFailed {
                url: self.url.clone(),
                source,
            }
        })?;
        check_unchanged(failure, &probed)?;

        let on_disk = part
            .on_disk_len()
            .map_err(|e| DownloadError::write(&failure.partial_path, e))?;
        if on_disk != failure.total_len {
            return Err(DownloadError::SizeMismatch {
                expected: failure.total_len,
                actual: on_disk,
            });
        }

        let work: Vec<(usize, Segment)> = failure
            .failures
            .iter()
            .map(|f| (f.index, f.segment))
            .collect();
        tracing::info!(url = %self.url, segments = ?failure.failed_indices(), "resuming failed segments");
        self.download(
            part,
            &failure.segments,
            &work,
            failure.ranged,
            failure.total_len,
            &probed,
            started,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn download(
        &self,
        part: PartFile,
        segments: &[Segment],
        work: &[(usize, Segment)],
        ranged: bool,
        total: u64,
        probed: &ProbeResult,
        started: Instant,
    ) -> Result<DownloadReport, DownloadError> {
        let counters = self.progress.install(total, segments);
        for (i, counter) in counters.iter().enumerate() {
            if !work.iter().any(|&(w, _)| w == i) {
                counter.mark_done();
            }
        }
        self.progress.set_state(JobState::Downloading);

        let req = SegmentRequest {
            url: &self.url,
            headers: &self.headers,
            opts: &self.curl,
            part: &part,
            counters: &counters,
            cancel: &self.cancel,
            ranged,
        };
        let failures = run::run_segments(&req, work, &self.retry)?;

        // A cancel that arrives after every segment landed changes nothing.
        if !failures.is_empty() {
            let cancelled = self.cancel.is_cancelled();
            let record = FailedDownload {
                url: self.url.clone(),
                dest: self.dest.clone(),
                partial_path: part.temp_path().to_path_buf(),
                total_len: total,
                segments: segments.to_vec(),
                failures,
                ranged,
                etag: probed.etag.clone(),
                last_modified: probed.last_modified.clone(),
            };
            return Err(if cancelled {
                DownloadError::Cancelled(record)
            } else {
                DownloadError::Failed(record)
            });
        }

        self.progress.set_state(JobState::Assembling);
        let written = self.progress.snapshot().bytes_done;
        if written != total {
            return Err(DownloadError::SizeMismatch {
                expected: total,
                actual: written,
            });
        }
        self.assemble(part, total)?;

        Ok(DownloadReport {
            path: self.dest.clone(),
            bytes: total,
            segments: segments.len(),
            ranged,
            elapsed: started.elapsed(),
        })
    }

    /// fsync, size and digest checks, then rename onto `dest`.
    fn assemble(&self, part: PartFile, total: u64) -> Result<(), DownloadError> {
        let temp = part.temp_path().to_path_buf();
        part.sync().map_err(|e| DownloadError::write(&temp, e))?;
        let actual = part.on_disk_len().map_err(|e| DownloadError::write(&temp, e))?;
        if actual != total {
            return Err(DownloadError::SizeMismatch { expected: total, actual });
        }
        if let Some(expected) = &self.expected_sha256 {
            let actual = File::open(&temp)
                .and_then(checksum::sha256_reader)
                .map_err(|e| DownloadError::write(&temp, e))?;
            if &actual != expected {
                return Err(DownloadError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
            tracing::debug!(sha256 = %actual, "checksum verified");
        }
        part.finalize(&self.dest)
            .map_err(|e| DownloadError::write(&self.dest, e))
    }
}

/// Refuse to resume into a partial file if the remote resource changed.
fn check_unchanged(failure: &FailedDownload, probed: &ProbeResult) -> Result<(), DownloadError> {
    let changed = |detail: String| DownloadError::RemoteChanged { detail };
    if probed.content_length != Some(failure.total_len) {
        return Err(changed(format!(
            "length was {}, now {:?}",
            failure.total_len, probed.content_length
        )));
    }
    if let (Some(old), Some(new)) = (&failure.etag, &probed.etag) {
        if old != new {
            return Err(changed(format!("ETag was {old:?}, now {new:?}")));
        }
    }
    if let (Some(old), Some(new)) = (&failure.last_modified, &probed.last_modified) {
        if old != new {
            return Err(changed(format!("Last-Modified was {old:?}, now {new:?}")));
        }
    }
    if failure.ranged && !probed.accept_ranges && failure.segments.len() > 1 {
        return Err(changed("server no longer accepts byte ranges".to_string()));
    }
    Ok(())
}
