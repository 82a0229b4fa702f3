//! `dispatch fetch`: run one segmented download with live progress.

use anyhow::{bail, Context, Result};
use dispatch_core::checksum;
use dispatch_core::config::DownloaderConfig;
use dispatch_core::downloader::{DownloadError, DownloadJob, JobState, ProgressStats};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct FetchArgs {
    pub url: String,
    pub dest: PathBuf,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub sha256: Option<String>,
    pub attempts: Option<u32>,
}

pub async fn run_fetch(defaults: &DownloaderConfig, args: FetchArgs) -> Result<()> {
    let mut cfg = defaults.clone();
    if let Some(n) = args.concurrency {
        cfg.concurrency = n;
    }
    if let Some(secs) = args.timeout_secs {
        cfg.per_request_timeout_secs = secs;
    }
    if let Some(n) = args.attempts {
        cfg.retry.get_or_insert_with(Default::default).max_attempts = n;
    }

    let mut job = DownloadJob::from_config(&args.url, &args.dest, &cfg)?;
    if let Some(hex) = args.sha256 {
        if !checksum::is_sha256_hex(&hex) {
            bail!("--sha256 must be 64 hex characters");
        }
        job = job.expected_sha256(hex);
    }

    let control = job.control();
    let printer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        loop {
            ticker.tick().await;
            let stats = control.progress();
            if stats.state == JobState::Downloading {
                print_progress(&stats);
            }
            if stats.state.is_terminal() {
                break;
            }
        }
    });

    let result = job.run_async().await;
    printer.abort();
    println!();

    match result {
        Ok(report) => {
            println!(
                "{} bytes -> {} ({} segment{}, {:.1}s)",
                report.bytes,
                report.path.display(),
                report.segments,
                if report.segments == 1 { "" } else { "s" },
                report.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(DownloadError::Failed(failed)) => {
            for f in &failed.failures {
                eprintln!("  {}", f);
            }
            Err(DownloadError::Failed(failed)).context("fetch incomplete")
        }
        Err(e) => Err(e.into()),
    }
}

fn print_progress(stats: &ProgressStats) {
    let done_mib = stats.bytes_done as f64 / 1_048_576.0;
    let total_mib = stats.total_bytes as f64 / 1_048_576.0;
    let eta = stats
        .eta()
        .map(|d| format!("{:.0}s", d.as_secs_f64()))
        .unwrap_or_else(|| "?".to_string());
    print!(
        "\r  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  {}/{} segments  ETA {}  ",
        done_mib,
        total_mib,
        stats.fraction() * 100.0,
        stats.bytes_per_sec() / 1_048_576.0,
        stats.segments_done,
        stats.segment_count,
        eta
    );
    let _ = std::io::stdout().flush();
}
