// src/errors.rs

//! Crate-wide error types.
//!
//! - [`DagrunError`] is what the public API returns (config loading, job
//!   submission, process plumbing).
//! - [`ValidationError`] describes why a job was rejected before anything ran.
//! - [`TaskError`] is the per-attempt failure recorded on a task result; it
//!   never escapes the scheduler as a `Result::Err`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid job: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Reasons a job is rejected at submission time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("job must contain at least one task")]
    EmptyJob,

    #[error("duplicate task id '{0}'")]
    DuplicateTask(String),

    #[error("task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("cycle detected in task DAG involving task '{0}'")]
    Cycle(String),

    #[error("task '{task}' references unknown action '{action}'")]
    UnknownAction { task: String, action: String },
}

/// Failure of a single task attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// The action itself reported failure (or panicked).
    #[error("action failed: {message}")]
    Action { message: String },

    #[error("timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    /// An isolated worker process died or spoke garbage.
    #[error("worker crashed: {message}")]
    BackendCrash { message: String },

    /// Recorded on skipped tasks.
    #[error("dependency '{dependency}' did not succeed")]
    DependencyFailed { dependency: String },
}

impl TaskError {
    pub fn action(message: impl Into<String>) -> Self {
        TaskError::Action {
            message: message.into(),
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        TaskError::TimedOut {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn crash(message: impl Into<String>) -> Self {
        TaskError::BackendCrash {
            message: message.into(),
        }
    }

    /// Whether the retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Action { .. } | TaskError::TimedOut { .. } | TaskError::BackendCrash { .. }
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagrunError>;
