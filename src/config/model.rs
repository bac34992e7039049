// src/config/model.rs

use serde::Deserialize;
use serde_json::Value;

use crate::dag::Job;
use crate::types::{ExecutionKind, FailurePolicy};

/// Top-level plan as read from a TOML (or JSON) file.
///
/// ```toml
/// id = "demo"
///
/// [config]
/// concurrency = 2
/// failure_policy = "continue"
///
/// [default]
/// timeout_seconds = 5.0
/// max_retries = 1
///
/// [[task]]
/// id = "a"
/// action = "sleep"
/// input = { seconds = 0.05 }
///
/// [[task]]
/// id = "b"
/// action = "noop"
/// depends_on = ["a"]
/// ```
///
/// Everything except the task list is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawJobFile {
    #[serde(default = "default_job_id")]
    pub id: String,

    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// `[[task]]` entries, in definition order.
    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

fn default_job_id() -> String {
    "job".to_string()
}

/// `[config]` section: run-wide limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Maximum in-flight tasks. Must be >= 1.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Worker pool size for isolated tasks; `None` means `min(16, cores)`.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub rate_limit_per_sec: Option<f64>,
}

fn default_concurrency() -> usize {
    4
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            workers: None,
            failure_policy: FailurePolicy::default(),
            rate_limit_per_sec: None,
        }
    }
}

/// `[default]` section, applied to tasks that do not override a field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultSection {
    #[serde(default)]
    pub timeout_seconds: Option<f64>,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub backoff: Option<BackoffConfig>,

    #[serde(default)]
    pub execution_kind: Option<ExecutionKind>,
}

/// `backoff = { base_ms = 10, multiplier = 2.0, max_ms = 30000 }`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

fn default_base_ms() -> u64 {
    10
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_ms() -> u64 {
    30_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            multiplier: default_multiplier(),
            max_ms: default_max_ms(),
        }
    }
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub id: String,

    /// Registered action name.
    pub action: String,

    /// Opaque payload handed to the action.
    #[serde(default)]
    pub input: Value,

    /// Tasks that must succeed first.
    #[serde(default, alias = "after")]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub timeout_seconds: Option<f64>,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub backoff: Option<BackoffConfig>,

    #[serde(default)]
    pub execution_kind: Option<ExecutionKind>,
}

/// Run-wide settings after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub concurrency: usize,
    pub workers: Option<usize>,
    pub failure_policy: FailurePolicy,
    pub rate_limit_per_sec: Option<f64>,
}

/// A plan file that passed validation: run settings plus a ready-to-run job.
///
/// Only constructible through `TryFrom<RawJobFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct JobFile {
    pub settings: RunSettings,
    pub job: Job,
}

/// Older JSON plan layout, still accepted by the loader:
///
/// ```json
/// {"jobs": [{"id": "a", "deps": [], "task": {"type": "sleep", "args": {"seconds": 0.1},
///   "timeout": 1.0, "max_retries": 2, "backoff_base": 0.01}}]}
/// ```
///
/// Jobs without an id are numbered `job_1..job_n`; `backoff_base` is in
/// seconds and doubles per retry.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyPlan {
    #[serde(default)]
    pub jobs: Vec<LegacyJob>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyJob {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub task: LegacyTask,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyTask {
    #[serde(rename = "type", default = "default_legacy_type")]
    pub kind: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_legacy_backoff_base")]
    pub backoff_base: f64,
}

fn default_legacy_type() -> String {
    "noop".to_string()
}

fn default_legacy_backoff_base() -> f64 {
    0.01
}

impl Default for LegacyTask {
    fn default() -> Self {
        Self {
            kind: default_legacy_type(),
            args: Value::Null,
            timeout: None,
            max_retries: 0,
            backoff_base: default_legacy_backoff_base(),
        }
    }
}

impl From<LegacyPlan> for RawJobFile {
    fn from(plan: LegacyPlan) -> Self {
        let task = plan
            .jobs
            .into_iter()
            .enumerate()
            .map(|(i, job)| TaskConfig {
                id: job.id.unwrap_or_else(|| format!("job_{}", i + 1)),
                action: job.task.kind,
                input: job.task.args,
                depends_on: job.deps,
                timeout_seconds: job.task.timeout,
                max_retries: Some(job.task.max_retries),
                backoff: Some(BackoffConfig {
                    base_ms: (job.task.backoff_base * 1000.0).round() as u64,
                    ..BackoffConfig::default()
                }),
                execution_kind: None,
            })
            .collect();

        RawJobFile {
            id: default_job_id(),
            config: ConfigSection::default(),
            default: DefaultSection::default(),
            task,
        }
    }
}
