//! `dispatch limit-probe`: tight-loop a limiter and report what it admitted.

use anyhow::{Context, Result};
use dispatch_core::config::LimiterConfig;
use std::time::{Duration, Instant};

#[derive(Debug, Default, PartialEq, Eq)]
struct ProbeCounts {
    admitted: u64,
    denied: u64,
}

pub fn run_limit_probe(cfg: &LimiterConfig, duration_ms: u64) -> Result<()> {
    let limiter = cfg.build().context("invalid limiter settings")?;
    let duration = Duration::from_millis(duration_ms);
    let started = Instant::now();
    let mut counts = ProbeCounts::default();
    let mut last_wait = None;
    while started.elapsed() < duration {
        match limiter.take() {
            Ok(()) => counts.admitted += 1,
            Err(denied) => {
                counts.denied += 1;
                last_wait = Some(denied.retry_after);
            }
        }
    }
    let elapsed = started.elapsed();
    let windows = elapsed.as_secs_f64() / cfg.interval().as_secs_f64();
    println!(
        "limit {} per {:?}: admitted {} denied {} in {:.0?} (ceiling ~{:.0})",
        cfg.limit,
        cfg.interval(),
        counts.admitted,
        counts.denied,
        elapsed,
        cfg.limit as f64 * (1.0 + windows)
    );
    if let Some(wait) = last_wait {
        println!("last retry_after {:?}", wait);
    }
    Ok(())
}
