// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`job`] holds validated task specs ([`TaskSpec`], [`Job`]).
//! - [`validate`] rejects malformed graphs before anything runs.
//! - [`graph`] holds dependency and dependent adjacency.
//! - [`backoff`] computes retry delays.
//! - [`scheduler`] contains the per-job state machine that decides which
//!   tasks are ready, applies retries and propagates failures.
//! - [`task_result`] is the per-task state the scheduler owns.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`event`] is the timeline of scheduling decisions.

pub mod backoff;
pub mod event;
pub mod graph;
pub mod job;
pub mod scheduler;
pub mod scheduler_step;
pub mod task_result;
pub mod validate;

pub use backoff::BackoffPolicy;
pub use event::{JobEvent, JobEventKind};
pub use graph::DagGraph;
pub use job::{Job, TaskId, TaskSpec};
pub use scheduler::{Scheduler, SchedulerOptions};
pub use scheduler_step::{RetryPlan, ScheduledTask, SchedulerStep};
pub use task_result::{AttemptRecord, TaskResult, TaskStatus};
pub use validate::validate_tasks;
