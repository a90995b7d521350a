// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Level construction: stable Kahn layering over the `after` graph.
//!
//! Each level is a set of tasks whose dependencies are all satisfied by
//! earlier levels, so every task in a level is schedulable concurrently.
//! Ordering within a level is by declaration index, which makes the layering
//! a total, deterministic function of the program: flattening the levels
//! yields the engine's `task_order`, stable across runs and unchanged by
//! permutations of unrelated tasks elsewhere in the plan.

use crate::plan::program::Task;
use std::collections::HashMap;
use thiserror::Error;

/// Defects that make a task graph unplannable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("duplicate task names found in plan")]
    DuplicateTaskNames,

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("cycle detected in plan: {}", .blocked.join(", "))]
    Cycle { blocked: Vec<String> },
}

/// Compute execution levels for the given tasks.
///
/// Returns one `Vec<String>` of task names per level, outermost order being
/// execution order. Fails on duplicate names, edges to undefined tasks, and
/// cycles (listing the still-blocked task names in declaration order).
pub fn build_execution_levels(tasks: &[Task]) -> Result<Vec<Vec<String>>, PlanError> {
    let graph = DependencyGraph::build(tasks)?;

    let mut in_degree = graph.in_degree.clone();
    let mut ready: Vec<&str> = tasks
        .iter()
        .filter(|task| in_degree[task.name.as_str()] == 0)
        .map(|task| task.name.as_str())
        .collect();

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut emitted = 0usize;

    while !ready.is_empty() {
        ready.sort_by_key(|name| graph.position[name]);
        emitted += ready.len();

        let mut next_ready: Vec<&str> = Vec::new();
        for name in &ready {
            for successor in &graph.adjacency[*name] {
                let degree = in_degree.get_mut(successor.as_str()).expect("known task");
                *degree -= 1;
                if *degree == 0 {
                    next_ready.push(successor);
                }
            }
        }

        levels.push(ready.iter().map(|name| name.to_string()).collect());
        ready = next_ready;
    }

    if emitted != tasks.len() {
        let blocked = tasks
            .iter()
            .filter(|task| in_degree[task.name.as_str()] > 0)
            .map(|task| task.name.clone())
            .collect();
        return Err(PlanError::Cycle { blocked });
    }

    Ok(levels)
}

/// Flattened topological order: the concatenation of the levels.
pub fn build_execution_order(tasks: &[Task]) -> Result<Vec<String>, PlanError> {
    Ok(build_execution_levels(tasks)?.into_iter().flatten().collect())
}

/// Render the plan as a Mermaid `graph TD` document.
///
/// The graph is validated first so the rendering never shows an
/// unexecutable plan.
pub fn build_mermaid_graph(tasks: &[Task]) -> Result<String, PlanError> {
    build_execution_levels(tasks)?;

    let node_ids: HashMap<&str, String> = tasks
        .iter()
        .enumerate()
        .map(|(index, task)| (task.name.as_str(), format!("T{}", index + 1)))
        .collect();

    let mut lines = vec!["graph TD".to_string()];
    for task in tasks {
        let label = task.name.replace('"', "'");
        lines.push(format!("  {}[\"{}\"]", node_ids[task.name.as_str()], label));
    }
    for task in tasks {
        for dependency in &task.after {
            lines.push(format!(
                "  {} --> {}",
                node_ids[dependency.as_str()],
                node_ids[task.name.as_str()]
            ));
        }
    }
    Ok(lines.join("\n"))
}

/// Forward adjacency plus the bookkeeping Kahn's algorithm needs.
struct DependencyGraph<'a> {
    adjacency: HashMap<&'a str, Vec<String>>,
    in_degree: HashMap<&'a str, usize>,
    position: HashMap<&'a str, usize>,
}

impl<'a> DependencyGraph<'a> {
    fn build(tasks: &'a [Task]) -> Result<Self, PlanError> {
        let mut adjacency: HashMap<&str, Vec<String>> = HashMap::new();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut position: HashMap<&str, usize> = HashMap::new();

        for (index, task) in tasks.iter().enumerate() {
            if position.insert(task.name.as_str(), index).is_some() {
                return Err(PlanError::DuplicateTaskNames);
            }
            adjacency.entry(task.name.as_str()).or_default();
            in_degree.entry(task.name.as_str()).or_insert(0);
        }

        for task in tasks {
            for dependency in &task.after {
                if !position.contains_key(dependency.as_str()) {
                    return Err(PlanError::UnknownDependency {
                        task: task.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                adjacency
                    .get_mut(dependency.as_str())
                    .expect("known task")
                    .push(task.name.clone());
                *in_degree.get_mut(task.name.as_str()).expect("known task") += 1;
            }
        }

        Ok(Self {
            adjacency,
            in_degree,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, after: &[&str]) -> Task {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "worker": format!("workers/{name}.py"),
            "after": after,
        }))
        .unwrap()
    }

    #[test]
    fn linear_chain_produces_one_task_per_level() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        let levels = build_execution_levels(&tasks).unwrap();
        assert_eq!(levels, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn independent_tasks_share_a_level_in_declaration_order() {
        let tasks = vec![task("c", &[]), task("a", &[]), task("b", &[])];
        let levels = build_execution_levels(&tasks).unwrap();
        assert_eq!(levels, vec![vec!["c", "a", "b"]]);
    }

    #[test]
    fn diamond_layers_are_stable() {
        let tasks = vec![
            task("source", &[]),
            task("left", &["source"]),
            task("right", &["source"]),
            task("sink", &["left", "right"]),
        ];
        let levels = build_execution_levels(&tasks).unwrap();
        assert_eq!(
            levels,
            vec![vec!["source"], vec!["left", "right"], vec!["sink"]]
        );
        assert_eq!(
            build_execution_order(&tasks).unwrap(),
            vec!["source", "left", "right", "sink"]
        );
    }

    #[test]
    fn permuting_unrelated_tasks_permutes_levels_identically() {
        let forward = vec![task("a", &[]), task("b", &[]), task("x", &["a"])];
        let swapped = vec![task("b", &[]), task("a", &[]), task("x", &["a"])];

        assert_eq!(
            build_execution_levels(&forward).unwrap(),
            vec![vec!["a", "b"], vec!["x"]]
        );
        assert_eq!(
            build_execution_levels(&swapped).unwrap(),
            vec![vec!["b", "a"], vec!["x"]]
        );
    }

    #[test]
    fn cycle_reports_blocked_names() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        let err = build_execution_levels(&tasks).unwrap_err();
        assert_eq!(
            err,
            PlanError::Cycle {
                blocked: vec!["a".to_string(), "b".to_string()],
            }
        );
        let message = err.to_string();
        assert!(message.contains("cycle detected in plan"));
        assert!(message.contains('a') && message.contains('b'));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let tasks = vec![task("a", &[]), task("a", &[])];
        assert_eq!(
            build_execution_levels(&tasks).unwrap_err(),
            PlanError::DuplicateTaskNames
        );
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let tasks = vec![task("a", &["ghost"])];
        assert_eq!(
            build_execution_levels(&tasks).unwrap_err(),
            PlanError::UnknownDependency {
                task: "a".to_string(),
                dependency: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn mermaid_rendering_lists_nodes_then_edges() {
        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let graph = build_mermaid_graph(&tasks).unwrap();
        let lines: Vec<&str> = graph.lines().collect();
        assert_eq!(lines[0], "graph TD");
        assert!(lines.contains(&"  T1[\"a\"]"));
        assert!(lines.contains(&"  T2[\"b\"]"));
        assert!(lines.contains(&"  T1 --> T2"));
    }
}
