// tests/isolated_pool.rs

use std::time::{Duration, Instant};

use serde_json::json;

use dagrun::dag::{Job, TaskStatus};
use dagrun::errors::TaskError;
use dagrun::exec::{ActionRegistry, WORKER_FLAG, WorkerCommand};
use dagrun::report::{JobResult, JobStatus};
use dagrun::{Orchestrator, OrchestratorOptions};
use dagrun_test_utils::{JobBuilder, TaskBuilder, init_tracing, with_timeout};

/// Workers are the real `dagrun` binary in worker mode.
fn options() -> OrchestratorOptions {
    OrchestratorOptions::default()
        .with_worker_command(WorkerCommand::new(env!("CARGO_BIN_EXE_dagrun")).arg(WORKER_FLAG))
}

async fn run(job: Job, options: OrchestratorOptions) -> JobResult {
    let orchestrator = Orchestrator::new(ActionRegistry::with_builtins(), options);
    with_timeout(orchestrator.run(job)).await.unwrap()
}

#[tokio::test]
async fn cpu_work_runs_in_a_worker() {
    init_tracing();

    let job = JobBuilder::new("cpu")
        .with_task(TaskBuilder::new("sum", "cpu").input(json!({ "work": 10 })).isolated())
        .with_task(TaskBuilder::new("report", "noop").after("sum"))
        .build();

    let result = run(job, options()).await;

    assert_eq!(result.overall_status, JobStatus::Succeeded);
    assert_eq!(result.task("sum").unwrap().output, Some(json!(45)));
    assert_eq!(result.task("report").unwrap().status, TaskStatus::Succeeded);
}

#[tokio::test]
async fn crashing_worker_fails_only_its_task() {
    init_tracing();

    let job = JobBuilder::new("crash")
        .with_task(TaskBuilder::new("boom", "crash").isolated())
        .with_task(TaskBuilder::new("sum", "cpu").input(json!({ "work": 10 })).isolated())
        .with_task(TaskBuilder::new("after_boom", "noop").after("boom"))
        .build();

    // One worker: `sum` has to run on the replacement process.
    let result = run(job, options().with_workers(1)).await;

    let boom = result.task("boom").unwrap();
    assert_eq!(boom.status, TaskStatus::Failed);
    assert!(
        matches!(boom.error, Some(TaskError::BackendCrash { .. })),
        "unexpected error {:?}",
        boom.error
    );
    assert_eq!(result.task("after_boom").unwrap().status, TaskStatus::Skipped);
    assert_eq!(result.task("sum").unwrap().output, Some(json!(45)));
    assert_eq!(result.overall_status, JobStatus::PartialFailure);
}

#[tokio::test]
async fn isolated_timeout_kills_the_worker() {
    init_tracing();

    let job = JobBuilder::new("timeout")
        .with_task(
            TaskBuilder::sleep("stuck", 30.0)
                .isolated()
                .timeout(Duration::from_millis(200)),
        )
        .build();

    let started = Instant::now();
    let result = run(job, options()).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    let stuck = result.task("stuck").unwrap();
    assert_eq!(stuck.status, TaskStatus::Failed);
    assert_eq!(stuck.error, Some(TaskError::TimedOut { timeout_ms: 200 }));
}

#[tokio::test]
async fn pool_size_bounds_isolated_parallelism() {
    init_tracing();

    let mut builder = JobBuilder::new("pool");
    for i in 0..4 {
        builder = builder.with_task(TaskBuilder::sleep(&format!("s{i}"), 0.2).isolated());
    }

    let started = Instant::now();
    let result = run(builder.build(), options().with_concurrency(4).with_workers(2)).await;

    assert_eq!(result.overall_status, JobStatus::Succeeded);
    assert_eq!(result.peak_concurrency, 2);
    // Two rounds of 200ms on two workers.
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn unknown_isolated_action_fails_in_the_worker() {
    init_tracing();

    let job = JobBuilder::new("ghost")
        .with_task(TaskBuilder::new("g", "teleport").isolated())
        .build();

    let result = run(job, options()).await;

    let g = result.task("g").unwrap();
    assert_eq!(g.status, TaskStatus::Failed);
    match &g.error {
        Some(TaskError::Action { message }) => assert!(message.contains("teleport"), "{message}"),
        other => panic!("unexpected error {other:?}"),
    }
}
