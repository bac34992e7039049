// src/dag/task_result.rs

//! Per-task execution state owned by the scheduler.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::dag::job::TaskId;
use crate::errors::TaskError;

/// Status of a task (or of a single attempt, in [`AttemptRecord`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started, or back on the ready queue for another attempt.
    Pending,
    /// Dispatched to a backend.
    Running,
    Succeeded,
    Failed,
    /// Never dispatched because a dependency did not succeed.
    Skipped,
    /// The latest attempt hit its deadline and a retry is pending. A task
    /// that keeps timing out finalizes as `Failed`.
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::TimedOut => "timed_out",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Status recorded for an attempt that ended with `outcome`.
    pub fn of_attempt(outcome: &Result<Value, TaskError>) -> Self {
        match outcome {
            Ok(_) => TaskStatus::Succeeded,
            Err(TaskError::TimedOut { .. }) => TaskStatus::TimedOut,
            Err(TaskError::Cancelled) => TaskStatus::Cancelled,
            Err(_) => TaskStatus::Failed,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Diagnostics for one attempt of a task.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub status: TaskStatus,
    pub started_at: Instant,
    pub ended_at: Instant,
    pub output: Option<Value>,
    pub error: Option<TaskError>,
    /// Delay applied before the next attempt, if one was scheduled.
    pub backoff: Option<Duration>,
}

impl AttemptRecord {
    pub fn duration(&self) -> Duration {
        self.ended_at.saturating_duration_since(self.started_at)
    }
}

/// Authoritative state of a task within a job run.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Attempts started so far.
    pub attempts: u32,
    /// Output of the successful attempt.
    pub output: Option<Value>,
    /// Error of the latest failed attempt (or skip/cancel reason).
    pub error: Option<TaskError>,
    /// Start of the first attempt.
    pub started_at: Option<Instant>,
    /// Set once the task reaches a terminal status.
    pub ended_at: Option<Instant>,
    /// Earliest time of the next attempt while a retry is pending.
    pub next_eligible_at: Option<Instant>,
    pub history: Vec<AttemptRecord>,
    /// Start of the attempt currently in flight.
    current_attempt_started: Option<Instant>,
}

impl TaskResult {
    /// A freshly eligible task.
    pub fn pending(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            attempts: 0,
            output: None,
            error: None,
            started_at: None,
            ended_at: None,
            next_eligible_at: None,
            history: Vec::new(),
            current_attempt_started: None,
        }
    }

    /// A task that finished without ever being dispatched.
    pub fn finished_without_running(
        task_id: TaskId,
        status: TaskStatus,
        error: TaskError,
        now: Instant,
    ) -> Self {
        let mut result = Self::pending(task_id);
        result.finish(status, Some(error), now);
        result
    }

    /// Terminal status and no retry pending. While `next_eligible_at` is set
    /// the status reflects the failed attempt (`failed` or `timed_out`).
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() && self.next_eligible_at.is_none()
    }

    /// Wall time from first start to finish; zero for tasks that never ran.
    pub fn duration(&self) -> Duration {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub(crate) fn begin_attempt(&mut self, now: Instant) -> u32 {
        self.attempts += 1;
        self.status = TaskStatus::Running;
        self.next_eligible_at = None;
        self.started_at.get_or_insert(now);
        self.current_attempt_started = Some(now);
        self.attempts
    }

    /// Append the finished attempt to the history.
    pub(crate) fn record_attempt(
        &mut self,
        outcome: &Result<Value, TaskError>,
        backoff: Option<Duration>,
        now: Instant,
    ) {
        let started_at = self.current_attempt_started.take().unwrap_or(now);
        let (output, error) = match outcome {
            Ok(value) => (Some(value.clone()), None),
            Err(err) => (None, Some(err.clone())),
        };

        self.history.push(AttemptRecord {
            attempt: self.attempts,
            status: TaskStatus::of_attempt(outcome),
            started_at,
            ended_at: now,
            output,
            error,
            backoff,
        });
    }

    pub(crate) fn await_retry(&mut self, error: TaskError, at: Instant) {
        self.status = match error {
            TaskError::TimedOut { .. } => TaskStatus::TimedOut,
            _ => TaskStatus::Failed,
        };
        self.error = Some(error);
        self.next_eligible_at = Some(at);
    }

    /// The retry timer fired; the task waits on the ready queue again.
    pub(crate) fn requeue(&mut self) {
        self.status = TaskStatus::Pending;
        self.next_eligible_at = None;
    }

    pub(crate) fn finish(&mut self, status: TaskStatus, error: Option<TaskError>, now: Instant) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.error = error;
        self.next_eligible_at = None;
        self.ended_at = Some(now);
    }

    pub(crate) fn succeed(&mut self, output: Value, now: Instant) {
        self.output = Some(output);
        self.finish(TaskStatus::Succeeded, None, now);
    }
}
