// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::errors::TaskError;
use crate::exec::ExecutorBackend;
use crate::report::JobResult;
use crate::types::ExecutionKind;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent, TaskCompletion};

type Timer = Pin<Box<dyn Future<Output = RuntimeEvent> + Send>>;

/// Drives the core runtime in response to backend completions, timers and
/// cancellation, and delegates execution to one `ExecutorBackend` per
/// execution kind.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. Everything here runs on a single task: cooperative
/// attempt futures are polled from this loop, so all bookkeeping happens
/// between their suspension points.
pub struct Runtime<C: ExecutorBackend, I: ExecutorBackend> {
    core: CoreRuntime,
    cooperative: C,
    isolated: I,
    cancel: CancellationToken,
    timers: FuturesUnordered<Timer>,
}

impl<C: ExecutorBackend, I: ExecutorBackend> fmt::Debug for Runtime<C, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl<C: ExecutorBackend, I: ExecutorBackend> Runtime<C, I> {
    pub fn new(core: CoreRuntime, cooperative: C, isolated: I, cancel: CancellationToken) -> Self {
        Self {
            core,
            cooperative,
            isolated,
            cancel,
            timers: FuturesUnordered::new(),
        }
    }

    /// Main event loop. Returns once every task is terminal.
    pub async fn run(mut self) -> JobResult {
        info!(job_id = %self.core.scheduler().job().id(), "dagrun runtime started");

        let step = self.core.start(Instant::now());
        self.apply(step.commands);

        let mut cancel_seen = false;
        while !self.core.is_finished() {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    RuntimeEvent::CancelRequested
                }
                Some(done) = self.cooperative.next_completion(), if self.cooperative.in_flight() > 0 => {
                    RuntimeEvent::TaskCompleted(done)
                }
                Some(done) = self.isolated.next_completion(), if self.isolated.in_flight() > 0 => {
                    RuntimeEvent::TaskCompleted(done)
                }
                Some(event) = self.timers.next(), if !self.timers.is_empty() => event,
                else => {
                    warn!("runtime has nothing left to wait on; stopping");
                    break;
                }
            };

            self.handle(event);
        }

        self.cooperative.shutdown().await;
        self.isolated.shutdown().await;

        let result = self.core.into_result(Instant::now());
        info!(
            job_id = %result.job_id,
            status = %result.overall_status,
            duration_ms = result.duration.as_millis() as u64,
            "runtime exiting"
        );
        result
    }

    /// Feed an event through the core and carry out what it asks for.
    fn handle(&mut self, event: RuntimeEvent) {
        let step = self.core.step(event, Instant::now());
        self.apply(step.commands);
    }

    /// Execute commands, feeding any synthetic events they produce back
    /// through the core until it settles.
    fn apply(&mut self, commands: Vec<CoreCommand>) {
        let mut queue: VecDeque<RuntimeEvent> = self.execute(commands).into();
        while let Some(event) = queue.pop_front() {
            let step = self.core.step(event, Instant::now());
            queue.extend(self.execute(step.commands));
        }
    }

    /// Execute commands from the core. Attempts a backend refuses come back
    /// as crashed completions.
    fn execute(&mut self, commands: Vec<CoreCommand>) -> Vec<RuntimeEvent> {
        let mut follow_up = Vec::new();

        for command in commands {
            match command {
                CoreCommand::Dispatch(tasks) => {
                    for task in tasks {
                        follow_up.extend(self.dispatch(task));
                    }
                }
                CoreCommand::ArmRetry { task_id, at } => {
                    debug!(task = %task_id, "arming retry timer");
                    self.arm(at, RuntimeEvent::RetryDue { task_id });
                }
                CoreCommand::ArmWake { at } => self.arm(at, RuntimeEvent::RateWindowOpened),
                CoreCommand::Interrupt(ids) => {
                    for id in ids {
                        self.cooperative.cancel(&id);
                        self.isolated.cancel(&id);
                    }
                }
            }
        }
        follow_up
    }

    fn dispatch(&mut self, task: ScheduledTask) -> Option<RuntimeEvent> {
        let task_id = task.task_id.clone();
        let attempt = task.attempt;

        let res = match task.kind {
            ExecutionKind::Cooperative => self.cooperative.dispatch(task),
            ExecutionKind::Isolated => self.isolated.dispatch(task),
        };

        match res {
            Ok(()) => None,
            Err(e) => {
                warn!(task = %task_id, attempt, error = %e, "backend refused task");
                Some(RuntimeEvent::TaskCompleted(TaskCompletion {
                    task_id,
                    attempt,
                    outcome: Err(TaskError::crash(e.to_string())),
                }))
            }
        }
    }

    fn arm(&mut self, at: Instant, event: RuntimeEvent) {
        let deadline = tokio::time::Instant::from_std(at);
        self.timers.push(Box::pin(async move {
            tokio::time::sleep_until(deadline).await;
            event
        }));
    }
}
