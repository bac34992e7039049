// src/exec/mod.rs

//! Execution layer.
//!
//! This module is responsible for actually running task attempts and
//! reporting their outcomes back to the runtime.
//!
//! - [`action`] defines the action contract and the name → action registry.
//! - [`builtin`] holds the actions every registry can start with.
//! - [`backend`] provides the `ExecutorBackend` trait the runtime drives, and
//!   which tests can replace with a fake implementation.
//! - [`cooperative`] polls action futures on the runtime's own loop.
//! - [`isolated`] runs attempts in a pool of worker processes, speaking the
//!   line protocol from [`protocol`] to workers that run [`worker::serve`].

pub mod action;
pub mod backend;
mod builtin;
pub mod cooperative;
pub mod isolated;
pub mod protocol;
pub mod worker;

pub use action::{Action, ActionContext, ActionError, ActionFuture, ActionRef, ActionRegistry};
pub use backend::{CompletionFuture, ExecutorBackend};
pub use cooperative::CooperativeBackend;
pub use isolated::{IsolatedBackend, WORKER_FLAG, WorkerCommand};
