// src/dag/event.rs

//! Timeline of scheduling decisions, kept on the final job result.

use std::time::Duration;

use serde::Serialize;

use crate::dag::job::TaskId;
use crate::dag::task_result::TaskStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    /// Offset from the start of the job.
    #[serde(rename = "at_ms", serialize_with = "as_millis")]
    pub at: Duration,
    pub task_id: TaskId,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEventKind {
    Ready,
    Dispatched { attempt: u32 },
    AttemptFinished { attempt: u32, status: TaskStatus },
    RetryScheduled {
        #[serde(rename = "delay_ms", serialize_with = "as_millis")]
        delay: Duration,
    },
    Skipped,
    Cancelled,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
