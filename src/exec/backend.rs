// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` for each execution kind instead
//! of owning task futures or processes itself. This makes it easy to swap in
//! a scripted fake in tests while keeping the production implementations in
//! [`cooperative`](super::cooperative) and [`isolated`](super::isolated).
//!
//! Dispatch and cancellation are synchronous; completions are pulled by the
//! runtime through [`ExecutorBackend::next_completion`].

use std::future::Future;
use std::pin::Pin;

use crate::dag::ScheduledTask;
use crate::engine::TaskCompletion;
use crate::errors::Result;

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Option<TaskCompletion>> + Send + 'a>>;

/// Trait abstracting how scheduled attempts are executed.
pub trait ExecutorBackend: Send {
    /// Start an attempt. Errors mean the backend could not accept it at all;
    /// the runtime records that as a crashed attempt.
    fn dispatch(&mut self, task: ScheduledTask) -> Result<()>;

    /// Interrupt an in-flight attempt. It still reports a completion
    /// (normally `TaskError::Cancelled`).
    fn cancel(&mut self, task_id: &str);

    /// Attempts dispatched but not yet returned by `next_completion`.
    fn in_flight(&self) -> usize;

    /// Wait for the next finished attempt. `None` once nothing is in flight.
    ///
    /// Must be cancel-safe: the runtime drops this future whenever another
    /// event wins the race.
    fn next_completion(&mut self) -> CompletionFuture<'_>;

    /// Release resources (worker processes) once the job is over.
    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}
