// src/exec/cooperative.rs

//! In-process execution of action futures.
//!
//! Nothing is spawned: attempt futures sit in a `FuturesUnordered` that the
//! runtime polls from its own loop, so cooperative tasks interleave at their
//! `.await` points on a single control flow.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dag::{ScheduledTask, TaskId};
use crate::engine::{TaskCompletion, TaskOutcome};
use crate::errors::{Result, TaskError};
use crate::exec::action::{ActionContext, ActionRegistry};
use crate::exec::backend::{CompletionFuture, ExecutorBackend};

type AttemptFuture = Pin<Box<dyn Future<Output = TaskCompletion> + Send>>;

pub struct CooperativeBackend {
    registry: Arc<ActionRegistry>,
    running: FuturesUnordered<AttemptFuture>,
    tokens: HashMap<TaskId, CancellationToken>,
}

impl std::fmt::Debug for CooperativeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooperativeBackend")
            .field("registry", &self.registry)
            .field("in_flight", &self.tokens.len())
            .finish()
    }
}

impl CooperativeBackend {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            running: FuturesUnordered::new(),
            tokens: HashMap::new(),
        }
    }
}

impl ExecutorBackend for CooperativeBackend {
    fn dispatch(&mut self, task: ScheduledTask) -> Result<()> {
        debug!(task = %task.task_id, attempt = task.attempt, action = %task.action.name, "starting cooperative attempt");

        let token = CancellationToken::new();
        self.tokens.insert(task.task_id.clone(), token.clone());
        self.running
            .push(run_attempt(Arc::clone(&self.registry), task, token));
        Ok(())
    }

    fn cancel(&mut self, task_id: &str) {
        if let Some(token) = self.tokens.get(task_id) {
            token.cancel();
        }
    }

    fn in_flight(&self) -> usize {
        self.running.len()
    }

    fn next_completion(&mut self) -> CompletionFuture<'_> {
        Box::pin(async move {
            let completion = self.running.next().await?;
            self.tokens.remove(&completion.task_id);
            Some(completion)
        })
    }
}

/// Build the future for one attempt: panic capture, optional deadline and
/// cancellation around the action itself.
fn run_attempt(
    registry: Arc<ActionRegistry>,
    task: ScheduledTask,
    token: CancellationToken,
) -> AttemptFuture {
    // Deadline runs from dispatch, not from first poll.
    let deadline = task.timeout.map(|t| (Instant::now() + t, t));

    Box::pin(async move {
        let ScheduledTask {
            task_id,
            attempt,
            action,
            ..
        } = task;

        let ctx = ActionContext {
            task_id: task_id.clone(),
            attempt,
            input: action.input.clone(),
        };

        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| registry.invoke(&action, ctx))) {
            Err(payload) => Err(panicked(&task_id, payload)),
            Ok(fut) => {
                let guarded = async {
                    match AssertUnwindSafe(fut).catch_unwind().await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(TaskError::action(err.to_string())),
                        Err(payload) => Err(panicked(&task_id, payload)),
                    }
                };

                let bounded = async {
                    match deadline {
                        Some((at, limit)) => tokio::time::timeout_at(at, guarded)
                            .await
                            .unwrap_or_else(|_| Err(TaskError::timed_out(limit))),
                        None => guarded.await,
                    }
                };

                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(TaskError::Cancelled),
                    outcome = bounded => outcome,
                }
            }
        };

        log_outcome(&task_id, attempt, &outcome);
        TaskCompletion {
            task_id,
            attempt,
            outcome,
        }
    })
}

fn panicked(task_id: &str, payload: Box<dyn Any + Send>) -> TaskError {
    let message = panic_message(payload.as_ref());
    warn!(task = %task_id, %message, "action panicked");
    TaskError::action(format!("panicked: {message}"))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn log_outcome(task_id: &str, attempt: u32, outcome: &TaskOutcome) {
    match outcome {
        Ok(_) => debug!(task = %task_id, attempt, "cooperative attempt succeeded"),
        Err(err) => debug!(task = %task_id, attempt, error = %err, "cooperative attempt failed"),
    }
}
