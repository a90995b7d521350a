// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Static validation of a program before execution.
//!
//! Every structural rule is checked and every violation reported; nothing
//! short-circuits except the cycle check, which runs last because the other
//! graph rules only make sense on an acyclic plan anyway. An empty result
//! means the program may execute.
//!
//! The rules:
//! * task names are unique
//! * every worker path resolves to an existing file
//! * timeout/retry/backoff/jitter values are sane, and backoff or jitter
//!   without retries is rejected
//! * `retry_if` is one of the known filters
//! * required capabilities are covered by the granted set (when one is
//!   enforced)
//! * typed artifacts appear in their consumes/produces clause and their
//!   type tokens canonicalize
//! * each artifact has at most one producer, no task consumes what it
//!   produces, and every consumed artifact has a producer the consumer can
//!   actually reach through `after` edges
//! * consumer and producer agree on an artifact's canonical type
//! * verify expressions parse under the safe grammar
//! * the `after` graph is acyclic

use crate::eval::{parse_expression, EvalError};
use crate::plan::levels::build_execution_order;
use crate::plan::program::{
    Program, Task, RETRY_IF_ERROR, RETRY_IF_TIMEOUT, RETRY_IF_WORKER_FAILURE,
};
use crate::schema::canonical_artifact_type;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Validate a program, returning one human-readable message per violation.
///
/// Pass `Some(capabilities)` to enforce capability coverage; `None` skips
/// that check (used by commands that have no grant context).
pub fn validate_program(
    program: &Program,
    capabilities: Option<&BTreeSet<String>>,
) -> Vec<String> {
    let mut errors = Vec::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for task in &program.tasks {
        if !seen.insert(task.name.as_str()) {
            errors.push(format!(
                "line {}: duplicate task name '{}'",
                task.line, task.name
            ));
        }
    }

    for task in &program.tasks {
        validate_task(program, task, capabilities, &mut errors);
    }

    validate_artifact_flow(program, &mut errors);

    for check in &program.verify {
        if let Err(EvalError::Syntax(_)) = parse_expression(&check.expression) {
            errors.push(format!(
                "line {}: verify expression could not be parsed: {}",
                check.line, check.expression
            ));
        }
    }

    if let Err(plan_error) = build_execution_order(&program.tasks) {
        errors.push(plan_error.to_string());
    }

    errors
}

fn validate_task(
    program: &Program,
    task: &Task,
    capabilities: Option<&BTreeSet<String>>,
    errors: &mut Vec<String>,
) {
    let worker_path = program.resolve_worker(&task.worker);
    if !worker_path.exists() {
        errors.push(format!(
            "line {}: worker '{}' does not exist ({})",
            task.line,
            task.worker,
            worker_path.display()
        ));
    }

    if let Some(timeout) = task.timeout_seconds {
        if timeout <= 0.0 {
            errors.push(format!(
                "line {}: task '{}' timeout_seconds must be > 0",
                task.line, task.name
            ));
        }
    }
    if task.retries < 0 {
        errors.push(format!(
            "line {}: task '{}' retries must be >= 0",
            task.line, task.name
        ));
    }
    if !matches!(
        task.retry_if.as_str(),
        RETRY_IF_ERROR | RETRY_IF_TIMEOUT | RETRY_IF_WORKER_FAILURE
    ) {
        errors.push(format!(
            "line {}: task '{}' retry_if must be one of: {}, {}, {}",
            task.line, task.name, RETRY_IF_ERROR, RETRY_IF_TIMEOUT, RETRY_IF_WORKER_FAILURE
        ));
    }
    if task.backoff_seconds < 0.0 {
        errors.push(format!(
            "line {}: task '{}' backoff_seconds must be >= 0",
            task.line, task.name
        ));
    }
    if task.backoff_seconds > 0.0 && task.retries == 0 {
        errors.push(format!(
            "line {}: task '{}' backoff_seconds requires retries > 0",
            task.line, task.name
        ));
    }
    if task.jitter_seconds < 0.0 {
        errors.push(format!(
            "line {}: task '{}' jitter_seconds must be >= 0",
            task.line, task.name
        ));
    }
    if task.jitter_seconds > 0.0 && task.retries == 0 {
        errors.push(format!(
            "line {}: task '{}' jitter_seconds requires retries > 0",
            task.line, task.name
        ));
    }

    if let Some(granted) = capabilities {
        let missing: Vec<&str> = task
            .requires
            .difference(granted)
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            errors.push(format!(
                "line {}: task '{}' requires missing capabilities: {}",
                task.line,
                task.name,
                missing.join(", ")
            ));
        }
    }

    for (artifact, token) in &task.consumes_types {
        if !task.consumes.contains(artifact) {
            errors.push(format!(
                "line {}: task '{}' has typed consume artifact '{}' not present in consumes clause",
                task.line, task.name, artifact
            ));
        }
        if canonical_artifact_type(token, &program.types).is_none() {
            errors.push(format!(
                "line {}: task '{}' uses unknown consumes type '{}' for artifact '{}'",
                task.line, task.name, token, artifact
            ));
        }
    }
    for (artifact, token) in &task.produces_types {
        if !task.produces.contains(artifact) {
            errors.push(format!(
                "line {}: task '{}' has typed produce artifact '{}' not present in produces clause",
                task.line, task.name, artifact
            ));
        }
        if canonical_artifact_type(token, &program.types).is_none() {
            errors.push(format!(
                "line {}: task '{}' uses unknown produces type '{}' for artifact '{}'",
                task.line, task.name, token, artifact
            ));
        }
    }
}

fn validate_artifact_flow(program: &Program, errors: &mut Vec<String>) {
    let mut producer_by_artifact: HashMap<&str, &str> = HashMap::new();
    let mut producer_type_by_artifact: HashMap<&str, &str> = HashMap::new();

    for task in &program.tasks {
        for artifact in &task.produces {
            match producer_by_artifact.get(artifact.as_str()) {
                Some(producer) if *producer != task.name => {
                    errors.push(format!(
                        "line {}: artifact '{}' is produced by multiple tasks ('{}', '{}')",
                        task.line, artifact, producer, task.name
                    ));
                }
                _ => {
                    producer_by_artifact.insert(artifact.as_str(), task.name.as_str());
                    if let Some(token) = task.produces_types.get(artifact) {
                        producer_type_by_artifact.insert(artifact.as_str(), token.as_str());
                    }
                }
            }
        }
        for artifact in &task.consumes {
            if task.produces.contains(artifact) {
                errors.push(format!(
                    "line {}: task '{}' cannot both consume and produce artifact '{}'",
                    task.line, task.name, artifact
                ));
            }
        }
    }

    let ancestors_by_task = build_ancestor_map(&program.tasks);
    for task in &program.tasks {
        for artifact in &task.consumes {
            let Some(producer) = producer_by_artifact.get(artifact.as_str()) else {
                errors.push(format!(
                    "line {}: task '{}' consumes unknown artifact '{}'",
                    task.line, task.name, artifact
                ));
                continue;
            };
            let reachable = ancestors_by_task
                .get(task.name.as_str())
                .map(|ancestors| ancestors.contains(producer))
                .unwrap_or(false);
            if !reachable {
                errors.push(format!(
                    "line {}: task '{}' consumes artifact '{}' from '{}' but has no dependency path to that producer",
                    task.line, task.name, artifact, producer
                ));
            }

            if let (Some(consumer_token), Some(producer_token)) = (
                task.consumes_types.get(artifact),
                producer_type_by_artifact.get(artifact.as_str()),
            ) {
                let consumer_type = canonical_artifact_type(consumer_token, &program.types);
                let producer_type = canonical_artifact_type(producer_token, &program.types);
                if let (Some(consumer_type), Some(producer_type)) = (consumer_type, producer_type) {
                    if consumer_type != producer_type {
                        errors.push(format!(
                            "line {}: task '{}' consumes artifact '{}' as '{}' but producer '{}' declares '{}'",
                            task.line, task.name, artifact, consumer_token, producer, producer_token
                        ));
                    }
                }
            }
        }
    }
}

/// Transitive `after` ancestors per task. Cycles are tolerated here (the
/// planner reports them); traversal just refuses to revisit.
fn build_ancestor_map<'a>(tasks: &'a [Task]) -> HashMap<&'a str, HashSet<&'a str>> {
    let task_by_name: HashMap<&str, &Task> = tasks
        .iter()
        .map(|task| (task.name.as_str(), task))
        .collect();

    fn ancestors<'a>(
        name: &'a str,
        task_by_name: &HashMap<&'a str, &'a Task>,
        memo: &mut HashMap<&'a str, HashSet<&'a str>>,
        visiting: &mut HashSet<&'a str>,
    ) -> HashSet<&'a str> {
        if let Some(found) = memo.get(name) {
            return found.clone();
        }
        if !visiting.insert(name) {
            return HashSet::new();
        }

        let mut out = HashSet::new();
        if let Some(task) = task_by_name.get(name) {
            for dependency in &task.after {
                if let Some(dependency_name) = task_by_name
                    .get(dependency.as_str())
                    .map(|task| task.name.as_str())
                {
                    out.insert(dependency_name);
                    out.extend(ancestors(dependency_name, task_by_name, memo, visiting));
                }
            }
        }
        visiting.remove(name);
        memo.insert(name, out.clone());
        out
    }

    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    task_by_name
        .keys()
        .map(|name| {
            let set = ancestors(name, &task_by_name, &mut memo, &mut visiting);
            (*name, set)
        })
        .collect()
}
