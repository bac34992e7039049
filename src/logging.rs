// src/logging.rs

//! Logging setup for `dagrun` using `tracing` + `tracing-subscriber`.
//!
//! Filter priority:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `DAGRUN_LOG` environment variable, in `EnvFilter` syntax
//!    (`debug`, `dagrun::exec=trace,info`, ...)
//! 3. default to `info`
//!
//! Logs always go to STDERR. Stdout carries the job summary in the
//! coordinator and the line protocol in workers.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV: &str = "DAGRUN_LOG";

/// Which process is logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRole {
    Coordinator,
    /// Worker stderr is captured by the pool and re-logged, so no colours.
    Worker,
}

/// Initialise the global logging subscriber. Fails if one is already set.
pub fn init_logging(cli_level: Option<LogLevel>, role: LogRole) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(role == LogRole::Coordinator)
        .with_ansi(role == LogRole::Coordinator)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_str());
    }
    env.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
