//! Dependency ordering for task execution.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("task `{name}` not found")]
    UnknownTask { name: String },
    #[error("task `{dependent}` depends on unknown task `{name}`")]
    UnknownDependency { name: String, dependent: String },
    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Compute the order in which `targets` and their transitive dependencies run.
///
/// Dependencies come before their dependents, in declaration order, and every
/// task appears at most once even when several targets share it.
pub fn execution_order(
    graph: &BTreeMap<String, Vec<String>>,
    targets: &[String],
) -> Result<Vec<String>, GraphError> {
    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut stack = Vec::new();
    for target in targets {
        if !graph.contains_key(target) {
            return Err(GraphError::UnknownTask {
                name: target.clone(),
            });
        }
        visit(graph, target, &mut stack, &mut done, &mut order)?;
    }
    Ok(order)
}

fn visit(
    graph: &BTreeMap<String, Vec<String>>,
    name: &str,
    stack: &mut Vec<String>,
    done: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> Result<(), GraphError> {
    if done.contains(name) {
        return Ok(());
    }
    if let Some(start) = stack.iter().position(|entry| entry == name) {
        let mut path = stack[start..].to_vec();
        path.push(name.to_string());
        return Err(GraphError::Cycle { path });
    }

    stack.push(name.to_string());
    for dep in graph.get(name).into_iter().flatten() {
        if !graph.contains_key(dep) {
            return Err(GraphError::UnknownDependency {
                name: dep.clone(),
                dependent: name.to_string(),
            });
        }
        visit(graph, dep, stack, done, order)?;
    }
    stack.pop();

    done.insert(name.to_string());
    order.push(name.to_string());
    Ok(())
}
