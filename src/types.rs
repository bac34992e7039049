use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which backend runs a task.
///
/// - `Cooperative`: the action future is polled by the coordinating loop and
///   interleaves with other cooperative tasks at `.await` points.
/// - `Isolated`: the action runs in a pooled worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    Cooperative,
    Isolated,
}

impl Default for ExecutionKind {
    fn default() -> Self {
        ExecutionKind::Cooperative
    }
}

impl FromStr for ExecutionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cooperative" => Ok(ExecutionKind::Cooperative),
            "isolated" => Ok(ExecutionKind::Isolated),
            other => Err(format!(
                "invalid execution_kind: {other} (expected \"cooperative\" or \"isolated\")"
            )),
        }
    }
}

/// What happens to the rest of the job when a task fails terminally.
///
/// - `Continue`: transitive dependents are skipped, independent branches keep
///   running (default).
/// - `Abort`: dependents are skipped and everything else still pending or in
///   flight is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Continue,
    Abort,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Continue
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(format!(
                "invalid failure_policy: {other} (expected \"continue\" or \"abort\")"
            )),
        }
    }
}

/// Output format for the job summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
