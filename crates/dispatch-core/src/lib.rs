//! Fleet dispatch primitives: pick a device, gate a command, fetch a payload.
//!
//! - [`balancer`]: round-robin and smooth weighted selection over a caller's slice.
//! - [`limiter`]: non-blocking token bucket that can be retuned while in use.
//! - [`downloader`]: probe, split, fetch in parallel, verify, rename.

pub mod config;
pub mod logging;

pub mod balancer;
pub mod checksum;
pub mod control;
pub mod downloader;
pub mod fetch_head;
pub mod limiter;
pub mod retry;
pub mod segmenter;
pub mod storage;

pub use balancer::{Balancer, BalancerPool, RoundRobin, SmoothWeighted, Strategy, Weighted};
pub use control::{CancelToken, JobControl};
pub use downloader::{DownloadError, DownloadJob, DownloadReport, FailedDownload, JobState, ProgressStats};
pub use limiter::{LimiterError, RateExceeded, RateLimiter};
