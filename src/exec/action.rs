// src/exec/action.rs

//! The action contract.
//!
//! An action is referenced from a task by name ([`ActionRef`]) together with
//! an opaque JSON input. The scheduler never looks inside the payload; it only
//! sees success (a JSON value) or failure (an [`ActionError`]).
//!
//! Actions live in an [`ActionRegistry`]. The cooperative backend resolves
//! names against the orchestrator's registry; isolated workers resolve them
//! against the registry passed to [`crate::exec::worker::serve`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::exec::builtin;

/// Reference to an action plus its input payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRef {
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

impl ActionRef {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }

    /// Action with a `null` input.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}

/// Everything an action receives for one attempt.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub task_id: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub input: Value,
}

/// Typed failure returned by an action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),

    #[error("unknown action '{0}'")]
    Unknown(String),
}

pub type ActionFuture = Pin<Box<dyn Future<Output = Result<Value, ActionError>> + Send + 'static>>;

/// A unit of work callable by name.
///
/// Implemented for any `Fn(ActionContext) -> impl Future` so plain async
/// functions and closures can be registered directly.
pub trait Action: Send + Sync + 'static {
    fn call(&self, ctx: ActionContext) -> ActionFuture;
}

impl<F, Fut> Action for F
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    fn call(&self, ctx: ActionContext) -> ActionFuture {
        Box::pin(self(ctx))
    }
}

/// Name → action lookup table.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.actions.keys().collect();
        names.sort();
        f.debug_struct("ActionRegistry")
            .field("actions", &names)
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `noop`, `sleep`, `cpu`, `fail`, `flaky`
    /// and `crash`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register (or replace) an action under `name`.
    pub fn register(&mut self, name: impl Into<String>, action: impl Action) -> &mut Self {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, action: impl Action) -> Self {
        self.register(name, action);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Start the referenced action. Unknown names fail the attempt rather than
    /// panicking.
    pub fn invoke(&self, action: &ActionRef, ctx: ActionContext) -> ActionFuture {
        match self.actions.get(&action.name) {
            Some(a) => a.call(ctx),
            None => {
                let name = action.name.clone();
                Box::pin(async move { Err(ActionError::Unknown(name)) })
            }
        }
    }
}
