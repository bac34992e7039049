// src/dag/job.rs

//! Static job description: tasks, their actions and dependency edges.
//!
//! A [`Job`] can only be constructed through [`Job::new`], which validates the
//! graph, so every `Job` in the program is known to be acyclic with no
//! dangling references. Specs are read-only from then on.

use std::collections::HashMap;
use std::time::Duration;

use crate::dag::backoff::BackoffPolicy;
use crate::dag::graph::DagGraph;
use crate::dag::validate::validate_tasks;
use crate::errors::ValidationError;
use crate::exec::ActionRef;
use crate::types::ExecutionKind;

/// Canonical task identifier type.
pub type TaskId = String;

/// Description of a single unit of work.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Tasks that must succeed before this one may start.
    pub dependencies: Vec<TaskId>,
    pub action: ActionRef,
    /// Per-attempt deadline, measured from dispatch.
    pub timeout: Option<Duration>,
    /// Retries after the first attempt; a task runs at most `max_retries + 1` times.
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    pub execution_kind: ExecutionKind,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, action: ActionRef) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            action,
            timeout: None,
            max_retries: 0,
            backoff: BackoffPolicy::default(),
            execution_kind: ExecutionKind::Cooperative,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_kind(mut self, kind: ExecutionKind) -> Self {
        self.execution_kind = kind;
        self
    }

    /// Total number of attempts the retry policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// A validated set of tasks.
#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    /// Specs in definition order.
    tasks: Vec<TaskSpec>,
    index: HashMap<TaskId, usize>,
    graph: DagGraph,
}

impl Job {
    /// Validate and build a job.
    ///
    /// Rejects empty jobs, duplicate ids, self/unknown dependencies and
    /// cycles. Nothing about the job is executed here.
    pub fn new(id: impl Into<String>, tasks: Vec<TaskSpec>) -> Result<Self, ValidationError> {
        validate_tasks(&tasks)?;

        let graph = DagGraph::from_specs(&tasks);
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        Ok(Self {
            id: id.into(),
            tasks,
            index,
            graph,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
