// src/engine/mod.rs

//! Orchestration engine for dagrun.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the optional dispatch rate limiter
//! - the main runtime event loop that reacts to:
//!   - task completions from the cooperative and isolated backends
//!   - retry and rate-limit timers
//!   - external cancellation
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use serde_json::Value;

use crate::dag::TaskId;
use crate::errors::TaskError;

/// Outcome of a single attempt as seen by the scheduler.
pub type TaskOutcome = Result<Value, TaskError>;

/// A backend finished (or gave up on) one attempt of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub attempt: u32,
    pub outcome: TaskOutcome,
}

/// Events flowing into the core from backends and timers.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    TaskCompleted(TaskCompletion),
    /// The backoff delay of a failed task has elapsed.
    RetryDue { task_id: TaskId },
    /// The rate-limit window has room again.
    RateWindowOpened,
    /// Stop the job (e.g. Ctrl-C).
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod rate;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use rate::RateLimiter;
pub use runtime::Runtime;
