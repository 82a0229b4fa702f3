//! Operator CLI for the fleet dispatch primitives.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dispatch_core::balancer::Strategy;
use dispatch_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_fetch, run_limit_probe, run_pick, FetchArgs};

#[derive(Debug, Parser)]
#[command(name = "dispatch")]
#[command(about = "Fleet dispatch: device selection, admission limiting, segmented payload fetch", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a payload with concurrent range requests.
    Fetch {
        /// Direct HTTP/HTTPS URL.
        url: String,
        /// Destination file.
        dest: PathBuf,
        /// Segments fetched in parallel (default from config).
        #[arg(short = 'n', long, value_name = "N")]
        concurrency: Option<usize>,
        /// Per-segment request timeout in seconds (default from config).
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Expected SHA-256 of the payload (hex).
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,
        /// Attempts per segment, including the first (default from config).
        #[arg(long, value_name = "N")]
        attempts: Option<u32>,
    },

    /// Draw from a balancer over the given weights and print the histogram.
    Pick {
        /// Item weights, one per device.
        #[arg(required = true)]
        weights: Vec<u32>,
        /// round_robin or weighted (default from config).
        #[arg(long)]
        strategy: Option<Strategy>,
        /// Number of draws.
        #[arg(long, default_value = "1000", value_name = "K")]
        draws: usize,
    },

    /// Hammer a rate limiter in a tight loop and report admissions.
    LimitProbe {
        /// Window length in milliseconds (default from config).
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
        /// Permits per window (default from config).
        #[arg(long, value_name = "N")]
        limit: Option<u64>,
        /// How long to run.
        #[arg(long, default_value = "2000", value_name = "MS")]
        duration_ms: u64,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                url,
                dest,
                concurrency,
                timeout,
                sha256,
                attempts,
            } => {
                let args = FetchArgs {
                    url,
                    dest,
                    concurrency,
                    timeout_secs: timeout,
                    sha256,
                    attempts,
                };
                run_fetch(&cfg.downloader, args).await?
            }
            CliCommand::Pick {
                weights,
                strategy,
                draws,
            } => run_pick(&weights, strategy.unwrap_or(cfg.balancer.strategy), draws)?,
            CliCommand::LimitProbe {
                interval_ms,
                limit,
                duration_ms,
            } => {
                let mut limiter = cfg.limiter;
                if let Some(ms) = interval_ms {
                    limiter.interval_ms = ms;
                }
                if let Some(n) = limit {
                    limiter.limit = n;
                }
                run_limit_probe(&limiter, duration_ms)?
            }
            CliCommand::Checksum { path } => run_checksum(&path)?,
        }

        Ok(())
    }
}
