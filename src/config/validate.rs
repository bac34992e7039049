// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{BackoffConfig, DefaultSection, JobFile, RawJobFile, RunSettings, TaskConfig};
use crate::dag::{BackoffPolicy, Job, TaskSpec};
use crate::errors::{DagrunError, Result};
use crate::exec::ActionRef;

impl TryFrom<RawJobFile> for JobFile {
    type Error = DagrunError;

    fn try_from(raw: RawJobFile) -> std::result::Result<Self, Self::Error> {
        let settings = validate_global_config(&raw)?;

        let tasks = raw
            .task
            .iter()
            .map(|t| task_spec(t, &raw.default))
            .collect::<Result<Vec<_>>>()?;

        // Graph checks (duplicates, unknown deps, cycles) live with the DAG.
        let job = Job::new(raw.id, tasks)?;

        Ok(JobFile { settings, job })
    }
}

fn validate_global_config(raw: &RawJobFile) -> Result<RunSettings> {
    let cfg = &raw.config;

    if cfg.concurrency == 0 {
        return Err(DagrunError::ConfigError(
            "[config].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.workers == Some(0) {
        return Err(DagrunError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if let Some(rate) = cfg.rate_limit_per_sec
        && !(rate.is_finite() && rate > 0.0)
    {
        return Err(DagrunError::ConfigError(format!(
            "[config].rate_limit_per_sec must be a positive number (got {rate})"
        )));
    }
    if let Some(backoff) = &raw.default.backoff {
        validate_backoff("[default].backoff", backoff)?;
    }
    if let Some(t) = raw.default.timeout_seconds {
        seconds("[default].timeout_seconds", t)?;
    }

    Ok(RunSettings {
        concurrency: cfg.concurrency,
        workers: cfg.workers,
        failure_policy: cfg.failure_policy,
        rate_limit_per_sec: cfg.rate_limit_per_sec,
    })
}

fn task_spec(task: &TaskConfig, defaults: &DefaultSection) -> Result<TaskSpec> {
    if task.id.trim().is_empty() {
        return Err(DagrunError::ConfigError("task id must not be empty".to_string()));
    }
    if task.action.trim().is_empty() {
        return Err(DagrunError::ConfigError(format!(
            "task '{}' has an empty action",
            task.id
        )));
    }

    let mut spec = TaskSpec::new(
        task.id.clone(),
        ActionRef::new(task.action.clone(), task.input.clone()),
    )
    .depends_on(task.depends_on.iter().cloned())
    .with_retries(task.max_retries.or(defaults.max_retries).unwrap_or(0))
    .with_kind(
        task.execution_kind
            .or(defaults.execution_kind)
            .unwrap_or_default(),
    );

    if let Some(t) = task.timeout_seconds.or(defaults.timeout_seconds) {
        spec = spec.with_timeout(seconds(&format!("task '{}' timeout_seconds", task.id), t)?);
    }

    if let Some(backoff) = task.backoff.or(defaults.backoff) {
        validate_backoff(&format!("task '{}' backoff", task.id), &backoff)?;
        spec = spec.with_backoff(backoff_policy(&backoff));
    }

    Ok(spec)
}

fn seconds(what: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| {
            DagrunError::ConfigError(format!("{what} must be a positive number of seconds (got {value})"))
        })
}

fn validate_backoff(what: &str, backoff: &BackoffConfig) -> Result<()> {
    if !(backoff.multiplier.is_finite() && backoff.multiplier >= 1.0) {
        return Err(DagrunError::ConfigError(format!(
            "{what}.multiplier must be >= 1.0 (got {})",
            backoff.multiplier
        )));
    }
    if backoff.max_ms < backoff.base_ms {
        return Err(DagrunError::ConfigError(format!(
            "{what}.max_ms ({}) must be >= base_ms ({})",
            backoff.max_ms, backoff.base_ms
        )));
    }
    Ok(())
}

fn backoff_policy(backoff: &BackoffConfig) -> BackoffPolicy {
    BackoffPolicy::new(
        Duration::from_millis(backoff.base_ms),
        backoff.multiplier,
        Duration::from_millis(backoff.max_ms),
    )
}
