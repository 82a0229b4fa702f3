//! `~/.config/dispatch/config.toml`: defaults for the balancer, the rate
//! limiter and download jobs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::balancer::Strategy;
use crate::limiter::{LimiterError, RateLimiter};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub balancer: BalancerConfig,
    pub limiter: LimiterConfig,
    pub downloader: DownloaderConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Window length in milliseconds; must be non-zero.
    pub interval_ms: u64,
    /// Permits per window.
    pub limit: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            limit: 10,
        }
    }
}

impl LimiterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn build(&self) -> Result<RateLimiter, LimiterError> {
        RateLimiter::new(self.interval(), self.limit)
    }
}

/// Retry policy parameters (optional `[downloader.retry]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per segment, including the first.
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.25,
            max_delay_secs: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Segments fetched in parallel.
    pub concurrency: usize,
    /// Whole-transfer timeout of one segment request.
    pub per_request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Abort a segment whose throughput stays below this for `low_speed_time_secs`. 0 disables.
    pub low_speed_limit_bytes: u32,
    pub low_speed_time_secs: u64,
    /// Absent means segments are not retried.
    pub retry: Option<RetryConfig>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            per_request_timeout_secs: 600,
            connect_timeout_secs: 30,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
            retry: None,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dispatch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DispatchConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<DispatchConfig> {
    if !path.exists() {
        let default_cfg = DispatchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DispatchConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    if cfg.limiter.interval_ms == 0 {
        anyhow::bail!("{}: limiter.interval_ms must be non-zero", path.display());
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = DispatchConfig::default();
        assert_eq!(cfg.balancer.strategy, Strategy::Weighted);
        assert_eq!(cfg.limiter.interval(), Duration::from_secs(1));
        assert_eq!(cfg.limiter.limit, 10);
        assert_eq!(cfg.downloader.concurrency, 4);
        assert!(cfg.downloader.retry.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut cfg = DispatchConfig::default();
        cfg.downloader.retry = Some(RetryConfig::default());
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: DispatchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_partial_sections() {
        let toml = r#"
            [balancer]
            strategy = "round_robin"

            [downloader]
            concurrency = 8

            [downloader.retry]
            max_attempts = 4
            base_delay_secs = 0.5
            max_delay_secs = 15
        "#;
        let cfg: DispatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.balancer.strategy, Strategy::RoundRobin);
        assert_eq!(cfg.limiter, LimiterConfig::default());
        assert_eq!(cfg.downloader.concurrency, 8);
        assert_eq!(cfg.downloader.per_request_timeout_secs, 600);
        let retry = cfg.downloader.retry.as_ref().unwrap();
        assert_eq!(retry.max_attempts, 4);
        assert!((retry.base_delay_secs - 0.5).abs() < 1e-9);
        assert!((retry.max_delay_secs - 15.0).abs() < 1e-9);
    }

    #[test]
    fn limiter_config_builds() {
        let l = LimiterConfig { interval_ms: 250, limit: 3 }.build().unwrap();
        assert_eq!(l.config(), (Duration::from_millis(250), 3));
        assert_eq!(
            LimiterConfig { interval_ms: 0, limit: 3 }.build().unwrap_err(),
            LimiterError::ZeroInterval
        );
    }

    #[test]
    fn load_or_init_creates_then_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let first = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(first, DispatchConfig::default());

        fs::write(&path, "[limiter]\ninterval_ms = 500\nlimit = 2\n").unwrap();
        let second = load_or_init_at(&path).unwrap();
        assert_eq!(second.limiter, LimiterConfig { interval_ms: 500, limit: 2 });
    }

    #[test]
    fn zero_interval_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[limiter]\ninterval_ms = 0\n").unwrap();
        let err = load_or_init_at(&path).unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }
}
