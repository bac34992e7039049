// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use std::time::{Duration, Instant};

use crate::dag::job::TaskId;
use crate::dag::task_result::TaskStatus;
use crate::exec::ActionRef;
use crate::types::ExecutionKind;

/// One attempt of a task, handed to an execution backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub task_id: TaskId,
    /// 1-based attempt number.
    pub attempt: u32,
    pub action: ActionRef,
    /// Deadline for this attempt, measured from dispatch.
    pub timeout: Option<Duration>,
    pub kind: ExecutionKind,
}

/// A retry the caller has to arm a timer for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPlan {
    pub task_id: TaskId,
    /// Attempt number that will run next.
    pub next_attempt: u32,
    pub delay: Duration,
    pub at: Instant,
}

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the DAG and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Task that reached a terminal status in this step, if any.
    pub finished: Option<(TaskId, TaskStatus)>,
    /// Retry to arm, if the completed attempt will be retried.
    pub retry: Option<RetryPlan>,
    /// Tasks that joined the ready queue as a result of this step.
    pub newly_ready: Vec<TaskId>,
    /// Tasks newly marked skipped (transitive dependents of a failure).
    pub newly_skipped: Vec<TaskId>,
    /// Tasks newly marked cancelled without having run.
    pub newly_cancelled: Vec<TaskId>,
    /// In-flight tasks whose backends must interrupt them.
    pub interrupt: Vec<TaskId>,
}
