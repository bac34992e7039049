#![allow(dead_code)]

use std::time::Duration;

use dagrun::dag::{BackoffPolicy, Job, TaskSpec};
use dagrun::errors::ValidationError;
use dagrun::exec::ActionRef;
use dagrun::types::ExecutionKind;
use serde_json::{Value, json};

/// Builder for `Job` to simplify test setup.
pub struct JobBuilder {
    id: String,
    tasks: Vec<TaskSpec>,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: TaskBuilder) -> Self {
        self.tasks.push(task.build());
        self
    }

    /// Shorthand for a `noop` task with the given dependencies.
    pub fn noop(self, id: &str, after: &[&str]) -> Self {
        let mut task = TaskBuilder::new(id, "noop");
        for dep in after {
            task = task.after(dep);
        }
        self.with_task(task)
    }

    pub fn try_build(self) -> Result<Job, ValidationError> {
        Job::new(self.id, self.tasks)
    }

    pub fn build(self) -> Job {
        self.try_build().expect("Failed to build valid job from builder")
    }
}

/// Builder for `TaskSpec`.
pub struct TaskBuilder {
    spec: TaskSpec,
}

impl TaskBuilder {
    pub fn new(id: &str, action: &str) -> Self {
        Self {
            spec: TaskSpec::new(id, ActionRef::named(action)),
        }
    }

    /// `sleep` task for `seconds`.
    pub fn sleep(id: &str, seconds: f64) -> Self {
        Self::new(id, "sleep").input(json!({ "seconds": seconds }))
    }

    pub fn input(mut self, input: Value) -> Self {
        self.spec.action.input = input;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.spec.dependencies.push(dep.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.spec.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, max_retries: u32) -> Self {
        self.spec.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, base: Duration, multiplier: f64, max: Duration) -> Self {
        self.spec.backoff = BackoffPolicy::new(base, multiplier, max);
        self
    }

    pub fn isolated(mut self) -> Self {
        self.spec.execution_kind = ExecutionKind::Isolated;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}
