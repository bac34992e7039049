// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::OutputFormat;

/// Command-line arguments for `dagrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagrun",
    version,
    about = "Run a DAG of tasks with bounded concurrency, retries and timeouts.",
    long_about = None
)]
pub struct CliArgs {
    /// Inline action descriptors, e.g. `sleep:0.1`, `cpu:100000`,
    /// `noop;id=c;after=a,b`. Each becomes one task.
    #[arg(value_name = "ACTION", conflicts_with = "plan")]
    pub actions: Vec<String>,

    /// Plan file (TOML, or JSON when the extension is `.json`).
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Maximum number of tasks in flight (overrides `[config].concurrency`).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: Option<u32>,

    /// Worker processes for isolated tasks (overrides `[config].workers`).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: Option<u32>,

    /// Summary format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Shorthand for `--format json`.
    #[arg(long)]
    pub json: bool,

    /// Cancel the rest of the job on the first task that fails for good.
    #[arg(long)]
    pub stop_on_error: bool,

    /// Maximum task starts per second.
    #[arg(long, value_name = "R")]
    pub rate: Option<f64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Serve isolated tasks over stdin/stdout (used by the worker pool).
    #[arg(long, hide = true)]
    pub worker: bool,
}

impl CliArgs {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
