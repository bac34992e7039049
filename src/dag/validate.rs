// src/dag/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::job::TaskSpec;
use crate::errors::ValidationError;

/// Check that a set of specs forms a valid DAG.
///
/// Runs before any scheduling state exists, so a rejected job never has a
/// single task dispatched.
pub fn validate_tasks(tasks: &[TaskSpec]) -> Result<(), ValidationError> {
    ensure_has_tasks(tasks)?;
    ensure_unique_ids(tasks)?;
    validate_dependencies(tasks)?;
    validate_acyclic(tasks)?;
    Ok(())
}

fn ensure_has_tasks(tasks: &[TaskSpec]) -> Result<(), ValidationError> {
    if tasks.is_empty() {
        return Err(ValidationError::EmptyJob);
    }
    Ok(())
}

fn ensure_unique_ids(tasks: &[TaskSpec]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(ValidationError::DuplicateTask(task.id.clone()));
        }
    }
    Ok(())
}

fn validate_dependencies(tasks: &[TaskSpec]) -> Result<(), ValidationError> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    for task in tasks {
        for dep in &task.dependencies {
            if dep == &task.id {
                return Err(ValidationError::SelfDependency(task.id.clone()));
            }
            if !ids.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_acyclic(tasks: &[TaskSpec]) -> Result<(), ValidationError> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for task in tasks {
        graph.add_node(task.id.as_str());
    }

    for task in tasks {
        for dep in &task.dependencies {
            graph.add_edge(dep.as_str(), task.id.as_str(), ());
        }
    }

    // A topological sort fails iff there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(ValidationError::Cycle(cycle.node_id().to_string())),
    }
}
