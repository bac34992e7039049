// src/orchestrator.rs

//! Library entry point: validate a job and run it to completion.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dag::{Job, Scheduler, SchedulerOptions};
use crate::engine::{CoreRuntime, RateLimiter, Runtime};
use crate::errors::{Result, ValidationError};
use crate::exec::{ActionRegistry, CooperativeBackend, ExecutorBackend, IsolatedBackend, WorkerCommand};
use crate::report::JobResult;
use crate::types::{ExecutionKind, FailurePolicy};

/// Upper bound on the default worker pool size.
const MAX_DEFAULT_WORKERS: usize = 16;

/// Run-wide settings.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Maximum in-flight tasks across both backends.
    pub concurrency: usize,
    /// Worker pool size; clamped to `concurrency` at run time.
    pub workers: usize,
    pub failure_policy: FailurePolicy,
    /// Maximum task starts per second, if any.
    pub rate_limit_per_sec: Option<f64>,
    /// How to start worker processes. Defaults to the current executable with
    /// `--worker`.
    pub worker_command: Option<WorkerCommand>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            workers: default_workers(),
            failure_policy: FailurePolicy::Continue,
            rate_limit_per_sec: None,
            worker_command: None,
        }
    }
}

impl OrchestratorOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_rate_limit(mut self, per_sec: f64) -> Self {
        self.rate_limit_per_sec = Some(per_sec);
        self
    }

    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }
}

/// `min(16, available cores)`.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

/// Runs validated jobs against a registry of actions.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<ActionRegistry>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(registry: ActionRegistry, options: OrchestratorOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            options,
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Check that every cooperative task names a registered action.
    ///
    /// Isolated actions are resolved by the worker binary, which may host a
    /// different registry.
    pub fn validate(&self, job: &Job) -> std::result::Result<(), ValidationError> {
        for task in job.tasks() {
            if task.execution_kind == ExecutionKind::Cooperative
                && !self.registry.contains(&task.action.name)
            {
                return Err(ValidationError::UnknownAction {
                    task: task.id.clone(),
                    action: task.action.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run `job` to completion.
    pub async fn run(&self, job: Job) -> Result<JobResult> {
        self.run_with_cancel(job, CancellationToken::new()).await
    }

    /// Run `job`, stopping early once `cancel` fires.
    pub async fn run_with_cancel(&self, job: Job, cancel: CancellationToken) -> Result<JobResult> {
        self.validate(&job)?;

        let command = match &self.options.worker_command {
            Some(command) => command.clone(),
            None => WorkerCommand::current_exe()?,
        };
        let concurrency = self.options.concurrency.max(1);
        let workers = self.options.workers.clamp(1, concurrency);

        let cooperative = CooperativeBackend::new(Arc::clone(&self.registry));
        let isolated = IsolatedBackend::new(command, workers);
        Ok(self.run_on(job, cooperative, isolated, cancel).await)
    }

    /// Run `job` on caller-supplied backends. Mostly for tests, which swap in
    /// scripted fakes.
    pub async fn run_on<C, I>(&self, job: Job, cooperative: C, isolated: I, cancel: CancellationToken) -> JobResult
    where
        C: ExecutorBackend,
        I: ExecutorBackend,
    {
        let concurrency = self.options.concurrency.max(1);
        let options = SchedulerOptions::new(concurrency)
            .with_isolated_slots(self.options.workers)
            .with_failure_policy(self.options.failure_policy);

        info!(
            job_id = %job.id(),
            tasks = job.len(),
            concurrency,
            workers = options.isolated_slots,
            policy = ?options.failure_policy,
            "starting job"
        );

        let scheduler = Scheduler::new(job, options, Instant::now());
        let rate = self.options.rate_limit_per_sec.and_then(RateLimiter::per_second);
        let core = CoreRuntime::new(scheduler, rate);

        Runtime::new(core, cooperative, isolated, cancel).run().await
    }
}
