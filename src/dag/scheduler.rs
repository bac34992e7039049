// src/dag/scheduler.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dag::event::{JobEvent, JobEventKind};
use crate::dag::job::{Job, TaskId};
use crate::dag::scheduler_step::{RetryPlan, ScheduledTask, SchedulerStep};
use crate::dag::task_result::{TaskResult, TaskStatus};
use crate::engine::TaskCompletion;
use crate::errors::TaskError;
use crate::report::{JobResult, JobStatus};
use crate::types::{ExecutionKind, FailurePolicy};

/// Limits the scheduler enforces at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Maximum number of in-flight tasks, cooperative and isolated together.
    pub concurrency: usize,
    /// Isolated tasks that may be in flight at once (worker pool size).
    pub isolated_slots: usize,
    pub failure_policy: FailurePolicy,
}

impl SchedulerOptions {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            concurrency,
            isolated_slots: concurrency,
            failure_policy: FailurePolicy::Continue,
        }
    }

    pub fn with_isolated_slots(mut self, slots: usize) -> Self {
        self.isolated_slots = slots.clamp(1, self.concurrency);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Scheduler holds a validated job plus all mutable per-run state.
///
/// It is responsible for:
/// - deciding when a task is ready (all dependencies succeeded)
/// - handing out dispatchable attempts under the concurrency limits
/// - applying the retry policy to failed attempts
/// - skipping transitive dependents of terminal failures
/// - cancelling whatever has not finished when asked to stop
///
/// It never touches time sources or IO itself: every method takes `now`, and
/// the caller arms timers for the [`RetryPlan`]s it returns.
#[derive(Debug)]
pub struct Scheduler {
    job: Job,
    options: SchedulerOptions,
    /// Dependencies not yet succeeded, per task.
    unresolved: HashMap<TaskId, usize>,
    /// Ready tasks in readiness order.
    ready: VecDeque<TaskId>,
    in_flight: HashMap<TaskId, ExecutionKind>,
    isolated_in_flight: usize,
    awaiting_retry: HashSet<TaskId>,
    results: HashMap<TaskId, TaskResult>,
    events: Vec<JobEvent>,
    started_at: Instant,
    peak_in_flight: usize,
    /// No further dispatch once set.
    halted: bool,
    /// Set by an external cancel request (not by the abort policy).
    cancelled: bool,
}

impl Scheduler {
    /// Build the run state for `job` and seed the ready queue with its roots,
    /// in definition order.
    pub fn new(job: Job, options: SchedulerOptions, now: Instant) -> Self {
        let mut unresolved = HashMap::with_capacity(job.len());
        let mut results = HashMap::with_capacity(job.len());

        for task in job.tasks() {
            unresolved.insert(task.id.clone(), job.graph().in_degree(&task.id));
            results.insert(task.id.clone(), TaskResult::pending(task.id.clone()));
        }

        let mut scheduler = Self {
            job,
            options,
            unresolved,
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            isolated_in_flight: 0,
            awaiting_retry: HashSet::new(),
            results,
            events: Vec::new(),
            started_at: now,
            peak_in_flight: 0,
            halted: false,
            cancelled: false,
        };

        let roots: Vec<TaskId> = scheduler.job.graph().roots().map(str::to_string).collect();
        for id in roots {
            scheduler.enqueue(id, now);
        }

        info!(
            job_id = %scheduler.job.id(),
            tasks = scheduler.job.len(),
            ready = scheduler.ready.len(),
            "scheduler initialised"
        );

        scheduler
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn result(&self, id: &str) -> Option<&TaskResult> {
        self.results.get(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn events(&self) -> &[JobEvent] {
        &self.events
    }

    /// Nothing is queued, running or waiting for a retry timer.
    pub fn is_finished(&self) -> bool {
        self.ready.is_empty() && self.in_flight.is_empty() && self.awaiting_retry.is_empty()
    }

    /// Whether [`pop_dispatchable`](Self::pop_dispatchable) would hand out a task.
    pub fn has_dispatchable(&self) -> bool {
        self.next_dispatchable_index().is_some()
    }

    /// Dequeue the next dispatchable task and mark its attempt as started.
    ///
    /// FIFO by readiness. Isolated tasks are passed over (keeping their
    /// position) while every pool slot is busy.
    pub fn pop_dispatchable(&mut self, now: Instant) -> Option<ScheduledTask> {
        let idx = self.next_dispatchable_index()?;
        let id = self.ready.remove(idx)?;

        let spec = self.job.task(&id)?;
        let scheduled = ScheduledTask {
            task_id: id.clone(),
            attempt: 0,
            action: spec.action.clone(),
            timeout: spec.timeout,
            kind: spec.execution_kind,
        };

        let result = self.results.get_mut(&id)?;
        let attempt = result.begin_attempt(now);

        if scheduled.kind == ExecutionKind::Isolated {
            self.isolated_in_flight += 1;
        }
        self.in_flight.insert(id.clone(), scheduled.kind);
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight.len());
        self.push_event(now, &id, JobEventKind::Dispatched { attempt });

        debug!(
            task = %id,
            attempt,
            kind = ?scheduled.kind,
            in_flight = self.in_flight.len(),
            "dispatching task"
        );

        Some(ScheduledTask {
            attempt,
            ..scheduled
        })
    }

    /// Dequeue everything dispatchable right now.
    pub fn drain_dispatchable(&mut self, now: Instant) -> Vec<ScheduledTask> {
        let mut out = Vec::new();
        while let Some(task) = self.pop_dispatchable(now) {
            out.push(task);
        }
        out
    }

    fn next_dispatchable_index(&self) -> Option<usize> {
        if self.halted || self.in_flight.len() >= self.options.concurrency {
            return None;
        }
        let pool_free = self.isolated_in_flight < self.options.isolated_slots;

        self.ready.iter().position(|id| {
            match self.job.task(id).map(|t| t.execution_kind) {
                Some(ExecutionKind::Isolated) => pool_free,
                Some(ExecutionKind::Cooperative) => true,
                None => false,
            }
        })
    }

    /// Apply the outcome of an attempt.
    ///
    /// Completions for tasks that are not in flight, or for an attempt other
    /// than the current one, are ignored.
    pub fn complete(&mut self, completion: TaskCompletion, now: Instant) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let TaskCompletion {
            task_id,
            attempt,
            outcome,
        } = completion;

        let current = self.results.get(&task_id).map(|r| r.attempts);
        if !self.in_flight.contains_key(&task_id) || current != Some(attempt) {
            warn!(task = %task_id, attempt, "ignoring stale completion");
            return step;
        }

        if let Some(ExecutionKind::Isolated) = self.in_flight.remove(&task_id) {
            self.isolated_in_flight -= 1;
        }

        let status = TaskStatus::of_attempt(&outcome);
        self.push_event(now, &task_id, JobEventKind::AttemptFinished { attempt, status });

        match outcome {
            Ok(value) => {
                if let Some(result) = self.results.get_mut(&task_id) {
                    result.record_attempt(&Ok(value.clone()), None, now);
                    result.succeed(value, now);
                }
                info!(task = %task_id, attempt, "task succeeded");
                step.finished = Some((task_id.clone(), TaskStatus::Succeeded));
                self.unblock_dependents(&task_id, now, &mut step);
            }
            Err(error) => self.handle_failure(task_id, attempt, error, now, &mut step),
        }

        step
    }

    fn handle_failure(
        &mut self,
        task_id: TaskId,
        attempt: u32,
        error: TaskError,
        now: Instant,
        step: &mut SchedulerStep,
    ) {
        let Some(spec) = self.job.task(&task_id) else {
            return;
        };
        let max_attempts = spec.max_attempts();
        let backoff = spec.backoff;
        let outcome = Err(error.clone());

        if error.is_retryable() && !self.halted && attempt < max_attempts {
            let delay = backoff.delay_for(attempt - 1);
            let at = now + delay;

            if let Some(result) = self.results.get_mut(&task_id) {
                result.record_attempt(&outcome, Some(delay), now);
                result.await_retry(error.clone(), at);
            }
            self.awaiting_retry.insert(task_id.clone());
            self.push_event(now, &task_id, JobEventKind::RetryScheduled { delay });

            warn!(
                task = %task_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed; retry scheduled"
            );

            step.retry = Some(RetryPlan {
                task_id,
                next_attempt: attempt + 1,
                delay,
                at,
            });
            return;
        }

        let status = match error {
            TaskError::Cancelled => TaskStatus::Cancelled,
            _ => TaskStatus::Failed,
        };

        if let Some(result) = self.results.get_mut(&task_id) {
            result.record_attempt(&outcome, None, now);
            result.finish(status, Some(error.clone()), now);
        }

        warn!(task = %task_id, attempt, %status, error = %error, "task finished unsuccessfully");
        step.finished = Some((task_id.clone(), status));
        self.skip_dependents(&task_id, now, step);

        if status == TaskStatus::Failed
            && self.options.failure_policy == FailurePolicy::Abort
            && !self.halted
        {
            info!(task = %task_id, "abort policy: cancelling remaining tasks");
            self.halt(now, step);
        }
    }

    fn unblock_dependents(&mut self, id: &str, now: Instant, step: &mut SchedulerStep) {
        let dependents: Vec<TaskId> = self.job.graph().dependents_of(id).to_vec();

        for dep in dependents {
            let Some(count) = self.unresolved.get_mut(&dep) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count > 0 {
                continue;
            }

            let eligible = self
                .results
                .get(&dep)
                .is_some_and(|r| !r.is_terminal() && r.attempts == 0);
            if eligible && !self.halted {
                self.enqueue(dep.clone(), now);
                step.newly_ready.push(dep);
            }
        }
    }

    /// Mark every transitive dependent of `failed` as skipped.
    fn skip_dependents(&mut self, failed: &str, now: Instant, step: &mut SchedulerStep) {
        let mut stack: Vec<(TaskId, TaskId)> = self
            .job
            .graph()
            .dependents_of(failed)
            .iter()
            .map(|d| (d.clone(), failed.to_string()))
            .collect();
        stack.reverse();

        while let Some((id, upstream)) = stack.pop() {
            let Some(result) = self.results.get_mut(&id) else {
                continue;
            };
            if result.is_terminal() {
                continue;
            }

            result.finish(
                TaskStatus::Skipped,
                Some(TaskError::DependencyFailed {
                    dependency: upstream.clone(),
                }),
                now,
            );
            self.ready.retain(|r| r != &id);
            self.push_event(now, &id, JobEventKind::Skipped);
            debug!(task = %id, dependency = %upstream, "skipping task");
            step.newly_skipped.push(id.clone());

            for next in self.job.graph().dependents_of(&id).iter().rev() {
                stack.push((next.clone(), id.clone()));
            }
        }
    }

    /// A retry timer fired: put the task back on the ready queue.
    pub fn retry_due(&mut self, id: &str, now: Instant) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if !self.awaiting_retry.remove(id) || self.halted {
            return step;
        }

        debug!(task = %id, "retry due");
        if let Some(result) = self.results.get_mut(id) {
            result.requeue();
        }
        self.enqueue(id.to_string(), now);
        step.newly_ready.push(id.to_string());
        step
    }

    /// Stop the job: nothing new is dispatched, everything that has not
    /// started (or is waiting for a retry) is cancelled, and in-flight tasks
    /// are listed for interruption.
    pub fn cancel(&mut self, now: Instant) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.cancelled {
            return step;
        }
        self.cancelled = true;
        info!(job_id = %self.job.id(), "cancellation requested");
        self.halt(now, &mut step);
        step
    }

    fn halt(&mut self, now: Instant, step: &mut SchedulerStep) {
        self.halted = true;
        self.ready.clear();
        self.awaiting_retry.clear();

        let ids: Vec<TaskId> = self.job.tasks().iter().map(|t| t.id.clone()).collect();
        for id in ids {
            if self.in_flight.contains_key(&id) {
                step.interrupt.push(id);
                continue;
            }
            let Some(result) = self.results.get_mut(&id) else {
                continue;
            };
            if result.is_terminal() {
                continue;
            }
            result.finish(TaskStatus::Cancelled, Some(TaskError::Cancelled), now);
            self.push_event(now, &id, JobEventKind::Cancelled);
            step.newly_cancelled.push(id);
        }
    }

    fn enqueue(&mut self, id: TaskId, now: Instant) {
        self.push_event(now, &id, JobEventKind::Ready);
        self.ready.push_back(id);
    }

    fn push_event(&mut self, now: Instant, id: &str, kind: JobEventKind) {
        self.events.push(JobEvent {
            at: now.saturating_duration_since(self.started_at),
            task_id: id.to_string(),
            kind,
        });
    }

    /// Consume the scheduler into the final job result.
    pub fn into_result(self, now: Instant) -> JobResult {
        let mut results = self.results;
        let tasks: Vec<TaskResult> = self
            .job
            .tasks()
            .iter()
            .filter_map(|t| results.remove(&t.id))
            .collect();

        let overall_status = JobStatus::from_tasks(&tasks, self.cancelled);

        JobResult {
            job_id: self.job.id().to_string(),
            tasks,
            overall_status,
            peak_concurrency: self.peak_in_flight,
            duration: now.saturating_duration_since(self.started_at),
            started_at: self.started_at,
            events: self.events,
        }
    }
}
