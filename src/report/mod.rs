// src/report/mod.rs

//! Final job results and their serializable summary.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::dag::{JobEvent, TaskResult, TaskStatus};
use crate::errors::TaskError;

pub mod render;

pub use render::{render_json, render_text};

/// Overall outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    PartialFailure,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `Succeeded` iff every task succeeded; `Cancelled` if the job was
    /// cancelled externally; `Failed` if no task succeeded; otherwise
    /// `PartialFailure`.
    pub fn from_tasks(tasks: &[TaskResult], cancelled: bool) -> Self {
        let succeeded = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Succeeded)
            .count();

        if succeeded == tasks.len() {
            JobStatus::Succeeded
        } else if cancelled {
            JobStatus::Cancelled
        } else if succeeded == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartialFailure
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(self) -> u8 {
        match self {
            JobStatus::Succeeded => 0,
            JobStatus::PartialFailure => 1,
            JobStatus::Failed => 2,
            JobStatus::Cancelled => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Succeeded => "succeeded",
            JobStatus::PartialFailure => "partial_failure",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Everything known about a finished job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    /// Task results in definition order.
    pub tasks: Vec<TaskResult>,
    pub overall_status: JobStatus,
    /// Highest number of tasks in flight at once.
    pub peak_concurrency: usize,
    pub duration: Duration,
    pub started_at: Instant,
    pub events: Vec<JobEvent>,
}

impl JobResult {
    pub fn task(&self, id: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.task_id == id)
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.job_id.clone(),
            status: self.overall_status,
            duration_ms: millis(self.duration),
            peak_concurrency: self.peak_concurrency,
            tasks: self
                .tasks
                .iter()
                .map(|t| TaskSummary::new(t, self.started_at))
                .collect(),
            events: self.events.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub duration_ms: u64,
    pub peak_concurrency: usize,
    pub tasks: Vec<TaskSummary>,
    /// Scheduling timeline, oldest first.
    pub events: Vec<JobEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub status: TaskStatus,
    pub attempts: u32,
    /// Offsets from the start of the job; `None` for tasks that never ran.
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub duration_ms: u64,
    pub error: Option<TaskError>,
    pub output: Option<Value>,
}

impl TaskSummary {
    pub fn new(r: &TaskResult, job_started: Instant) -> Self {
        let offset = |at: Instant| millis(at.saturating_duration_since(job_started));
        Self {
            id: r.task_id.clone(),
            status: r.status,
            attempts: r.attempts,
            started_at_ms: r.started_at.map(offset),
            ended_at_ms: r.ended_at.map(offset),
            duration_ms: millis(r.duration()),
            error: r.error.clone(),
            output: r.output.clone(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
