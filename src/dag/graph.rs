// src/dag/graph.rs

use std::collections::HashMap;

use crate::dag::job::{TaskId, TaskSpec};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one, in definition order.
    dependents: Vec<TaskId>,
}

/// In-memory adjacency of a job, keyed by task id.
///
/// Acyclicity and referential integrity are checked in [`crate::dag::validate`]
/// before a graph is built; here we only keep adjacency for scheduling.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<TaskId, DagNode>,
    /// Task ids in definition order.
    order: Vec<TaskId>,
}

impl DagGraph {
    /// Build the adjacency for a set of task specs.
    ///
    /// Dependency references that do not name a task are ignored; callers
    /// validate first.
    pub fn from_specs(specs: &[TaskSpec]) -> Self {
        let mut nodes: HashMap<TaskId, DagNode> = HashMap::with_capacity(specs.len());
        let mut order = Vec::with_capacity(specs.len());

        for spec in specs {
            order.push(spec.id.clone());
            nodes.insert(
                spec.id.clone(),
                DagNode {
                    deps: spec.dependencies.clone(),
                    dependents: Vec::new(),
                },
            );
        }

        // Iterating specs (not the map) keeps dependents in definition order.
        for spec in specs {
            for dep in &spec.dependencies {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    if !dep_node.dependents.contains(&spec.id) {
                        dep_node.dependents.push(spec.id.clone());
                    }
                }
            }
        }

        Self { nodes, order }
    }

    /// All task ids in definition order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Number of distinct dependencies, i.e. the in-degree used for readiness.
    pub fn in_degree(&self, id: &str) -> usize {
        let deps = self.dependencies_of(id);
        deps.iter()
            .enumerate()
            .filter(|(i, d)| !deps[..*i].contains(d))
            .count()
    }

    /// Tasks with no dependencies, in definition order.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.tasks()
            .filter(move |id| self.dependencies_of(id).is_empty())
    }
}
