//! Fan segments out to scoped threads, one per segment, and collect the failures.

use std::thread;

use super::error::{DownloadError, SegmentError, SegmentFailed};
use super::segment::SegmentRequest;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::segmenter::Segment;

/// Runs every `(index, segment)` in `work` concurrently and waits for all of
/// them. A failing segment never stops its siblings; failures come back
/// ordered by index.
pub(super) fn run_segments(
    req: &SegmentRequest<'_>,
    work: &[(usize, Segment)],
    policy: &RetryPolicy,
) -> Result<Vec<SegmentFailed>, DownloadError> {
    run_segments_with(req, work, policy, |index| {
        thread::Builder::new().name(format!("segment-{index}"))
    })
}

fn run_segments_with<B>(
    req: &SegmentRequest<'_>,
    work: &[(usize, Segment)],
    policy: &RetryPolicy,
    builder: B,
) -> Result<Vec<SegmentFailed>, DownloadError>
where
    B: Fn(usize) -> thread::Builder,
{
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(work.len());
        let mut failures = Vec::new();
        for &(index, segment) in work {
            let spawned = builder(index).spawn_scoped(s, move || {
                tracing::debug!(index, start = segment.start, end = segment.end, "segment started");
                run_with_retry(policy, req.cancel, |attempt| {
                    if attempt > 1 {
                        tracing::debug!(index, attempt, "segment retry");
                    }
                    req.fetch(index, segment)
                })
            });
            match spawned {
                Ok(h) => handles.push((index, segment, h)),
                Err(e) => {
                    tracing::warn!(index, error = %e, "could not spawn segment worker");
                    failures.push(SegmentFailed {
                        index,
                        segment,
                        cause: SegmentError::Spawn(e),
                    });
                }
            }
        }

        let mut panicked = None;
        for (index, segment, handle) in handles {
            match handle.join() {
                Ok(Ok(())) => tracing::debug!(index, bytes = segment.len(), "segment done"),
                Ok(Err(cause)) => {
                    tracing::warn!(index, start = segment.start, end = segment.end, error = %cause, "segment failed");
                    failures.push(SegmentFailed { index, segment, cause });
                }
                Err(_) => panicked = Some(index),
            }
        }
        if let Some(index) = panicked {
            return Err(DownloadError::Worker(format!("segment {index} worker panicked")));
        }
        failures.sort_by_key(|f| f.index);
        Ok(failures)
    })
}
