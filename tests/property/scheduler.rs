use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use proptest::prelude::*;
use serde_json::Value;

use dagrun::dag::{Job, ScheduledTask, Scheduler, SchedulerOptions, TaskStatus};
use dagrun::engine::TaskCompletion;
use dagrun::errors::TaskError;
use dagrun_test_utils::{JobBuilder, TaskBuilder};

/// A generated job plus, per task, how many attempts fail before one
/// succeeds.
#[derive(Debug, Clone)]
struct Case {
    job: Job,
    failures: HashMap<String, u32>,
}

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn case_strategy(max_tasks: usize) -> impl Strategy<Value = Case> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..3),
            num_tasks,
        );
        let retries = proptest::collection::vec(0..3u32, num_tasks);
        let failures = proptest::collection::vec(prop_oneof![3 => Just(0u32), 1 => 1..4u32], num_tasks);

        (deps, retries, failures).prop_map(move |(raw_deps, retries, fails)| {
            let mut builder = JobBuilder::new("prop");
            let mut failures = HashMap::new();

            for (i, potential) in raw_deps.into_iter().enumerate() {
                let id = format!("task_{i}");
                let mut task = TaskBuilder::new(&id, "noop")
                    .retries(retries[i])
                    .backoff(Duration::ZERO, 1.0, Duration::ZERO);

                let valid: HashSet<usize> = if i == 0 {
                    HashSet::new()
                } else {
                    potential.into_iter().map(|d| d % i).collect()
                };
                for dep in valid {
                    task = task.after(&format!("task_{dep}"));
                }

                failures.insert(id, fails[i]);
                builder = builder.with_task(task);
            }

            Case {
                job: builder.build(),
                failures,
            }
        })
    })
}

fn outcome(task: &ScheduledTask, failures: &HashMap<String, u32>) -> TaskCompletion {
    let fail_until = failures.get(&task.task_id).copied().unwrap_or(0);
    TaskCompletion {
        task_id: task.task_id.clone(),
        attempt: task.attempt,
        outcome: if task.attempt <= fail_until {
            Err(TaskError::action("scripted failure"))
        } else {
            Ok(Value::Null)
        },
    }
}

proptest! {
    #[test]
    fn scheduler_terminates_with_consistent_statuses(
        case in case_strategy(12),
        cap in 1..5usize,
        // Complete the newest in-flight attempt instead of the oldest.
        lifo in any::<bool>(),
        cancel_after in proptest::option::of(0..20usize),
    ) {
        let Case { job, failures } = case;
        let ids: Vec<String> = job.tasks().iter().map(|t| t.id.clone()).collect();
        let now = Instant::now();
        let mut scheduler = Scheduler::new(job.clone(), SchedulerOptions::new(cap), now);

        let mut running: VecDeque<ScheduledTask> = VecDeque::new();
        let mut dispatched: HashSet<String> = HashSet::new();
        let mut completions = 0usize;
        let mut steps = 0usize;
        let max_steps = 10_000;

        while !scheduler.is_finished() && steps < max_steps {
            steps += 1;

            for task in scheduler.drain_dispatchable(now) {
                dispatched.insert(task.task_id.clone());
                running.push_back(task);
            }
            prop_assert!(scheduler.in_flight_count() <= cap);
            prop_assert_eq!(scheduler.in_flight_count(), running.len());

            if cancel_after == Some(completions) && !scheduler.is_cancelled() {
                let step = scheduler.cancel(now);
                prop_assert!(!scheduler.has_dispatchable());
                for id in &step.interrupt {
                    prop_assert!(running.iter().any(|t| &t.task_id == id));
                }
                // Interrupted attempts report back as cancelled.
                for task in running.drain(..) {
                    scheduler.complete(
                        TaskCompletion {
                            task_id: task.task_id,
                            attempt: task.attempt,
                            outcome: Err(TaskError::Cancelled),
                        },
                        now,
                    );
                }
                continue;
            }

            let next = if lifo { running.pop_back() } else { running.pop_front() };
            let Some(task) = next else {
                // Nothing running and nothing dispatchable means the
                // scheduler should already consider itself finished.
                prop_assert!(scheduler.is_finished(), "scheduler stalled");
                break;
            };

            completions += 1;
            let step = scheduler.complete(outcome(&task, &failures), now);
            if let Some(retry) = step.retry {
                prop_assert_eq!(retry.next_attempt, task.attempt + 1);
                scheduler.retry_due(&retry.task_id, now);
            }
        }

        prop_assert!(steps < max_steps, "simulation did not terminate");
        prop_assert!(running.is_empty());

        let cancelled = scheduler.is_cancelled();
        let result = scheduler.into_result(now);
        prop_assert_eq!(result.tasks.len(), ids.len());
        prop_assert!(result.peak_concurrency <= cap);

        for task in &result.tasks {
            prop_assert!(task.status.is_terminal(), "{} ended as {}", task.task_id, task.status);

            let spec = job.task(&task.task_id).unwrap();
            prop_assert!(task.attempts <= spec.max_attempts());
            prop_assert_eq!(task.history.len() as u32, task.attempts);

            match task.status {
                TaskStatus::Skipped => {
                    prop_assert!(!dispatched.contains(&task.task_id));
                    prop_assert_eq!(task.attempts, 0);
                }
                TaskStatus::Succeeded => {
                    for dep in &spec.dependencies {
                        prop_assert_eq!(result.task(dep).unwrap().status, TaskStatus::Succeeded);
                    }
                }
                TaskStatus::Failed => prop_assert!(task.attempts > 0),
                TaskStatus::Cancelled => prop_assert!(cancelled),
                _ => {}
            }
        }

        if !cancelled {
            // Without cancellation the outcome is fully determined by the
            // failure script.
            for task in &result.tasks {
                let spec = job.task(&task.task_id).unwrap();
                let deps_ok = spec
                    .dependencies
                    .iter()
                    .all(|d| result.task(d).unwrap().status == TaskStatus::Succeeded);
                let own_ok = failures[&task.task_id] < spec.max_attempts();
                let expected = match (deps_ok, own_ok) {
                    (false, _) => TaskStatus::Skipped,
                    (true, true) => TaskStatus::Succeeded,
                    (true, false) => TaskStatus::Failed,
                };
                prop_assert_eq!(task.status, expected, "task {}", task.task_id);
            }
        }
    }
}
