use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dagrun::dag::{ScheduledTask, TaskId};
use dagrun::engine::{TaskCompletion, TaskOutcome};
use dagrun::errors::{Result, TaskError};
use dagrun::exec::{CompletionFuture, ExecutorBackend};

type Pending = Pin<Box<dyn Future<Output = TaskCompletion> + Send>>;

/// What one scripted attempt does: wait, then report `outcome`.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub delay: Duration,
    pub outcome: TaskOutcome,
}

impl ScriptStep {
    pub fn ok(delay: Duration) -> Self {
        Self {
            delay,
            outcome: Ok(Value::Null),
        }
    }

    pub fn fail(delay: Duration, message: &str) -> Self {
        Self {
            delay,
            outcome: Err(TaskError::action(message)),
        }
    }

    pub fn with_outcome(delay: Duration, outcome: TaskOutcome) -> Self {
        Self { delay, outcome }
    }
}

/// Shared record of what a [`ScriptedBackend`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct DispatchLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    dispatched: Vec<(TaskId, u32)>,
    cancelled: Vec<TaskId>,
    current: usize,
    peak: usize,
}

impl DispatchLog {
    /// Task ids in dispatch order (one entry per attempt).
    pub fn dispatched(&self) -> Vec<TaskId> {
        self.inner
            .lock()
            .unwrap()
            .dispatched
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn attempts_of(&self, task_id: &str) -> Vec<u32> {
        self.inner
            .lock()
            .unwrap()
            .dispatched
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, attempt)| *attempt)
            .collect()
    }

    pub fn cancelled(&self) -> Vec<TaskId> {
        self.inner.lock().unwrap().cancelled.clone()
    }

    /// Highest number of attempts in flight at once.
    pub fn peak(&self) -> usize {
        self.inner.lock().unwrap().peak
    }

    fn started(&self, task: &ScheduledTask) {
        let mut inner = self.inner.lock().unwrap();
        inner.dispatched.push((task.task_id.clone(), task.attempt));
        inner.current += 1;
        inner.peak = inner.peak.max(inner.current);
    }

    fn ended(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.current = inner.current.saturating_sub(1);
    }

    fn interrupted(&self, task_id: &str) {
        self.inner.lock().unwrap().cancelled.push(task_id.to_string());
    }
}

/// A fake backend that:
/// - records every dispatch in a [`DispatchLog`]
/// - replays a per-task script of delays and outcomes, one step per attempt
///   (the last step repeats; unscripted tasks succeed after `default_delay`)
/// - reports `TaskError::Cancelled` for interrupted attempts.
pub struct ScriptedBackend {
    scripts: HashMap<TaskId, VecDeque<ScriptStep>>,
    default_delay: Duration,
    running: FuturesUnordered<Pending>,
    tokens: HashMap<TaskId, CancellationToken>,
    refuse: bool,
    log: DispatchLog,
}

impl ScriptedBackend {
    pub fn new(log: DispatchLog) -> Self {
        Self {
            scripts: HashMap::new(),
            default_delay: Duration::ZERO,
            running: FuturesUnordered::new(),
            tokens: HashMap::new(),
            refuse: false,
            log,
        }
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn script(mut self, task_id: &str, steps: Vec<ScriptStep>) -> Self {
        self.scripts.insert(task_id.to_string(), steps.into());
        self
    }

    /// Reject every dispatch, as a backend that cannot start work would.
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    fn next_step(&mut self, task_id: &str) -> ScriptStep {
        match self.scripts.get_mut(task_id) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) if !steps.is_empty() => steps[0].clone(),
            _ => ScriptStep::ok(self.default_delay),
        }
    }
}

impl ExecutorBackend for ScriptedBackend {
    fn dispatch(&mut self, task: ScheduledTask) -> Result<()> {
        if self.refuse {
            return Err(dagrun::errors::DagrunError::Backend(format!(
                "refusing {}",
                task.task_id
            )));
        }

        self.log.started(&task);
        let step = self.next_step(&task.task_id);
        let token = CancellationToken::new();
        self.tokens.insert(task.task_id.clone(), token.clone());

        let ScheduledTask {
            task_id, attempt, ..
        } = task;
        self.running.push(Box::pin(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(TaskError::Cancelled),
                _ = tokio::time::sleep(step.delay) => step.outcome,
            };
            TaskCompletion {
                task_id,
                attempt,
                outcome,
            }
        }));
        Ok(())
    }

    fn cancel(&mut self, task_id: &str) {
        if let Some(token) = self.tokens.get(task_id) {
            self.log.interrupted(task_id);
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
            self.log.ended();
            Some(completion)
        })
    }
}
