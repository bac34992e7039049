// tests/orchestrator_cooperative.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use dagrun::dag::{JobEventKind, TaskStatus};
use dagrun::errors::{DagrunError, TaskError, ValidationError};
use dagrun::exec::{ActionContext, ActionError, ActionRegistry};
use dagrun::report::JobStatus;
use dagrun::types::FailurePolicy;
use dagrun::{Orchestrator, OrchestratorOptions};
use dagrun_test_utils::{JobBuilder, TaskBuilder, init_tracing, with_timeout};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn builtins(options: OrchestratorOptions) -> Orchestrator {
    Orchestrator::new(ActionRegistry::with_builtins(), options)
}

#[tokio::test]
async fn independent_sleeps_overlap() {
    init_tracing();

    let job = JobBuilder::new("overlap")
        .with_task(TaskBuilder::sleep("a", 0.05))
        .with_task(TaskBuilder::sleep("b", 0.05))
        .with_task(TaskBuilder::new("c", "noop").after("a").after("b"))
        .build();

    let started = Instant::now();
    let result = with_timeout(builtins(OrchestratorOptions::default()).run(job))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.overall_status, JobStatus::Succeeded);
    assert!(elapsed < ms(100), "sleeps did not overlap: {elapsed:?}");
    assert_eq!(result.peak_concurrency, 2);

    // c starts only after both a and b finished.
    let c = result.task("c").unwrap();
    for dep in ["a", "b"] {
        let ended = result.task(dep).unwrap().ended_at.unwrap();
        assert!(c.started_at.unwrap() >= ended, "c started before {dep} finished");
    }
    assert_eq!(c.output, Some(json!("c")));
}

#[tokio::test]
async fn flaky_action_recovers_within_retry_budget() {
    init_tracing();

    let job = JobBuilder::new("flaky")
        .with_task(
            TaskBuilder::new("f", "flaky")
                .input(json!({ "fail_until": 2 }))
                .retries(2)
                .backoff(ms(5), 2.0, ms(100)),
        )
        .build();

    let result = with_timeout(builtins(OrchestratorOptions::default()).run(job))
        .await
        .unwrap();

    let f = result.task("f").unwrap();
    assert_eq!(f.status, TaskStatus::Succeeded);
    assert_eq!(f.attempts, 3);
    assert_eq!(f.output, Some(json!("flaky_ok_after_3")));

    let statuses: Vec<_> = f.history.iter().map(|a| a.status).collect();
    assert_eq!(
        statuses,
        vec![TaskStatus::Failed, TaskStatus::Failed, TaskStatus::Succeeded]
    );

    let retries = result
        .events
        .iter()
        .filter(|e| matches!(e.kind, JobEventKind::RetryScheduled { .. }))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn timeout_fails_the_attempt_and_skips_dependents() {
    init_tracing();

    let job = JobBuilder::new("timeout")
        .with_task(TaskBuilder::sleep("slow", 5.0).timeout(ms(30)))
        .with_task(TaskBuilder::new("next", "noop").after("slow"))
        .with_task(TaskBuilder::new("other", "noop"))
        .build();

    let started = Instant::now();
    let result = with_timeout(builtins(OrchestratorOptions::default()).run(job))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let slow = result.task("slow").unwrap();
    assert_eq!(slow.status, TaskStatus::Failed);
    assert_eq!(slow.error, Some(TaskError::TimedOut { timeout_ms: 30 }));
    assert_eq!(slow.history[0].status, TaskStatus::TimedOut);

    assert_eq!(result.task("next").unwrap().status, TaskStatus::Skipped);
    assert_eq!(result.task("other").unwrap().status, TaskStatus::Succeeded);
    assert_eq!(result.overall_status, JobStatus::PartialFailure);
}

#[tokio::test]
async fn timed_out_attempts_are_retried() {
    init_tracing();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    // First attempt hangs, the second returns at once.
    let registry = ActionRegistry::new().with("sticky", move |ctx: ActionContext| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if ctx.attempt == 1 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok::<_, ActionError>(json!(ctx.attempt))
        }
    });

    let job = JobBuilder::new("sticky")
        .with_task(
            TaskBuilder::new("s", "sticky")
                .timeout(ms(20))
                .retries(1)
                .backoff(ms(1), 1.0, ms(1)),
        )
        .build();

    let result = with_timeout(Orchestrator::new(registry, OrchestratorOptions::default()).run(job))
        .await
        .unwrap();

    let s = result.task("s").unwrap();
    assert_eq!(s.status, TaskStatus::Succeeded);
    assert_eq!(s.output, Some(json!(2)));
    assert_eq!(s.history[0].status, TaskStatus::TimedOut);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrency_limit_holds_with_real_actions() {
    init_tracing();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let registry = {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        ActionRegistry::new().with("gauge", move |_ctx: ActionContext| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ActionError>(Value::Null)
            }
        })
    };

    let mut builder = JobBuilder::new("gauge");
    for i in 0..12 {
        builder = builder.with_task(TaskBuilder::new(&format!("p{i}"), "gauge"));
    }

    let options = OrchestratorOptions::default().with_concurrency(3);
    let result = with_timeout(Orchestrator::new(registry, options).run(builder.build()))
        .await
        .unwrap();

    assert_eq!(result.overall_status, JobStatus::Succeeded);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert_eq!(result.peak_concurrency, 3);
}

#[tokio::test]
async fn panicking_action_fails_only_its_task() {
    init_tracing();

    let registry = ActionRegistry::with_builtins().with("explode", |ctx: ActionContext| async move {
        if ctx.attempt > 0 {
            panic!("kaboom");
        }
        Ok::<_, ActionError>(Value::Null)
    });

    let job = JobBuilder::new("panic")
        .with_task(TaskBuilder::new("boom", "explode"))
        .with_task(TaskBuilder::sleep("fine", 0.01))
        .build();

    let result = with_timeout(Orchestrator::new(registry, OrchestratorOptions::default()).run(job))
        .await
        .unwrap();

    let boom = result.task("boom").unwrap();
    assert_eq!(boom.status, TaskStatus::Failed);
    match &boom.error {
        Some(TaskError::Action { message }) => assert!(message.contains("kaboom"), "{message}"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(result.task("fine").unwrap().status, TaskStatus::Succeeded);
    assert_eq!(result.overall_status, JobStatus::PartialFailure);
}

#[tokio::test]
async fn stop_on_error_cancels_pending_work() {
    init_tracing();

    let job = JobBuilder::new("abort")
        .with_task(TaskBuilder::new("bad", "fail"))
        .with_task(TaskBuilder::sleep("long", 5.0))
        .with_task(TaskBuilder::new("tail", "noop").after("long"))
        .build();

    let options = OrchestratorOptions::default().with_failure_policy(FailurePolicy::Abort);
    let started = Instant::now();
    let result = with_timeout(builtins(options).run(job)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(result.task("bad").unwrap().status, TaskStatus::Failed);
    assert_eq!(result.task("long").unwrap().status, TaskStatus::Cancelled);
    assert_eq!(result.task("tail").unwrap().status, TaskStatus::Cancelled);
    assert_eq!(result.overall_status, JobStatus::Failed);
}

#[tokio::test]
async fn cancellation_token_stops_a_running_job() {
    init_tracing();

    let job = JobBuilder::new("cancel")
        .with_task(TaskBuilder::sleep("done", 0.0))
        .with_task(TaskBuilder::sleep("long", 5.0).after("done"))
        .with_task(TaskBuilder::new("never", "noop").after("long"))
        .build();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ms(50)).await;
            cancel.cancel();
        });
    }

    let result = with_timeout(builtins(OrchestratorOptions::default()).run_with_cancel(job, cancel))
        .await
        .unwrap();

    assert_eq!(result.task("done").unwrap().status, TaskStatus::Succeeded);
    assert_eq!(result.task("long").unwrap().status, TaskStatus::Cancelled);
    let never = result.task("never").unwrap();
    assert_eq!(never.status, TaskStatus::Cancelled);
    assert_eq!(never.attempts, 0);
    assert_eq!(result.overall_status, JobStatus::Cancelled);
}

#[tokio::test]
async fn unknown_actions_are_rejected_before_running() {
    init_tracing();

    let job = JobBuilder::new("unknown")
        .with_task(TaskBuilder::new("a", "noop"))
        .with_task(TaskBuilder::new("b", "teleport").after("a"))
        .build();

    let err = builtins(OrchestratorOptions::default()).run(job).await.unwrap_err();
    assert!(matches!(
        err,
        DagrunError::Validation(ValidationError::UnknownAction { ref task, ref action })
            if task == "b" && action == "teleport"
    ));
}

#[test]
fn malformed_graphs_are_rejected_at_submission() {
    let cycle = JobBuilder::new("cycle")
        .noop("a", &["c"])
        .noop("b", &["a"])
        .noop("c", &["b"])
        .try_build()
        .unwrap_err();
    assert!(matches!(cycle, ValidationError::Cycle(_)));

    let missing = JobBuilder::new("missing").noop("a", &["ghost"]).try_build().unwrap_err();
    assert_eq!(
        missing,
        ValidationError::UnknownDependency {
            task: "a".into(),
            dependency: "ghost".into()
        }
    );

    let dup = JobBuilder::new("dup").noop("a", &[]).noop("a", &[]).try_build().unwrap_err();
    assert_eq!(dup, ValidationError::DuplicateTask("a".into()));

    let empty = JobBuilder::new("empty").try_build().unwrap_err();
    assert_eq!(empty, ValidationError::EmptyJob);
}
