// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-task result records, shared by the dispatcher, the retry controller,
//! the engine, and the trace document.
//!
//! A `TaskResult` is produced for every task the engine touches, whether the
//! worker ran or the engine synthesized a failure without dispatching.
//! Runtime failures are always folded into a result; nothing escapes as a
//! panic or error return from the execution path.

use crate::plan::program::Task;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ok,
    Error,
}

impl TaskStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, TaskStatus::Ok)
    }
}

/// One line of the attempt history kept in `provenance.attempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub status: TaskStatus,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

/// The record of one task's terminal outcome (or of one attempt, before the
/// retry controller folds the history in).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: String,
    pub worker: String,
    pub status: TaskStatus,
    pub confidence: f64,
    pub output: Map<String, Value>,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
    pub provenance: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl TaskResult {
    /// Synthesized failure for a task whose consumed artifacts were never
    /// published upstream.
    pub fn artifact_consume_missing(
        task: &Task,
        resolved_worker: &str,
        missing: &[String],
        now: String,
    ) -> Self {
        let mut provenance = Map::new();
        provenance.insert("worker".to_string(), Value::from(resolved_worker));
        provenance.insert("artifact_stage".to_string(), Value::from("consume"));
        provenance.insert(
            "missing_artifacts".to_string(),
            Value::from(missing.to_vec()),
        );
        provenance.insert("artifact_only".to_string(), Value::Bool(true));

        Self::synthesized_failure(
            task,
            crate::protocol::codes::ARTIFACT_CONSUME_MISSING,
            format!("missing required artifact(s): {}", missing.join(", ")),
            provenance,
            now,
        )
    }

    /// Synthesized failure for a payload that violated the input contract.
    /// No worker is dispatched for these.
    pub fn contract_input_violation(
        task: &Task,
        resolved_worker: &str,
        errors: &[String],
        now: String,
    ) -> Self {
        let mut provenance = Map::new();
        provenance.insert("worker".to_string(), Value::from(resolved_worker));
        provenance.insert("contract_stage".to_string(), Value::from("input"));
        provenance.insert("contract_only".to_string(), Value::Bool(true));

        Self::synthesized_failure(
            task,
            crate::protocol::codes::CONTRACT_INPUT_VIOLATION,
            format!("input contract violation: {}", errors.join("; ")),
            provenance,
            now,
        )
    }

    /// Synthesized failure for dispatcher-level breakage: unresolvable
    /// commands, spawn errors, or a panicked task body.
    pub fn runtime_failure(task: &Task, resolved_worker: &str, error: &str, now: String) -> Self {
        let mut provenance = Map::new();
        provenance.insert("worker".to_string(), Value::from(resolved_worker));
        provenance.insert("runtime_failure".to_string(), Value::Bool(true));

        Self::synthesized_failure(
            task,
            crate::protocol::codes::RUNTIME_EXECUTION_FAILURE,
            format!("runtime execution failure: {error}"),
            provenance,
            now,
        )
    }

    fn synthesized_failure(
        task: &Task,
        code: &str,
        message: String,
        provenance: Map<String, Value>,
        now: String,
    ) -> Self {
        Self {
            task: task.name.clone(),
            worker: task.worker.clone(),
            status: TaskStatus::Error,
            confidence: 0.0,
            output: Map::new(),
            error_code: Some(code.to_string()),
            error: Some(message),
            started_at: now.clone(),
            finished_at: now,
            provenance,
            stderr: None,
        }
    }

    /// Demote this result to a failure with the given code, appending the
    /// message to any error text already present. Used by the engine's
    /// post-dispatch contract checks.
    pub fn mark_failed(&mut self, code: &str, message: String) {
        self.status = TaskStatus::Error;
        self.confidence = 0.0;
        self.error_code = Some(code.to_string());
        self.error = Some(merge_error(self.error.take(), &message));
    }

    /// Summary line for the attempt history.
    pub fn attempt_record(&self, attempt: u32) -> AttemptRecord {
        AttemptRecord {
            attempt,
            status: self.status,
            error_code: self.error_code.clone(),
            error: self.error.clone(),
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
        }
    }
}

/// Append a message to existing error text, separating with `"; "`.
pub fn merge_error(existing: Option<String>, appended: &str) -> String {
    match existing {
        Some(text) if !text.trim().is_empty() => format!("{text}; {appended}"),
        _ => appended.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codes;

    fn sample_task() -> Task {
        serde_json::from_value(serde_json::json!({
            "name": "deploy_prod",
            "worker": "workers/deploy_prod.py",
        }))
        .unwrap()
    }

    #[test]
    fn synthesized_failures_carry_code_and_provenance() {
        let task = sample_task();
        let missing = vec!["report".to_string()];
        let result = TaskResult::artifact_consume_missing(
            &task,
            "/plans/workers/deploy_prod.py",
            &missing,
            "t0".to_string(),
        );

        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(
            result.error_code.as_deref(),
            Some(codes::ARTIFACT_CONSUME_MISSING)
        );
        assert_eq!(
            result.error.as_deref(),
            Some("missing required artifact(s): report")
        );
        assert_eq!(
            result.provenance["missing_artifacts"],
            serde_json::json!(["report"])
        );
        assert_eq!(result.provenance["artifact_only"], serde_json::json!(true));
    }

    #[test]
    fn mark_failed_appends_to_existing_error() {
        let task = sample_task();
        let mut result =
            TaskResult::runtime_failure(&task, "/w.py", "spawn refused", "t0".to_string());
        result.mark_failed(codes::CONTRACT_OUTPUT_VIOLATION, "output contract violation: x".to_string());

        assert_eq!(
            result.error_code.as_deref(),
            Some(codes::CONTRACT_OUTPUT_VIOLATION)
        );
        let error = result.error.unwrap();
        assert!(error.contains("runtime execution failure: spawn refused"));
        assert!(error.contains("; output contract violation: x"));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn serialization_omits_stderr_when_absent() {
        let task = sample_task();
        let result = TaskResult::runtime_failure(&task, "/w.py", "boom", "t0".to_string());
        let wire = serde_json::to_value(&result).unwrap();
        assert!(wire.get("stderr").is_none());
        // error_code/error stay present (as null when unset elsewhere).
        assert!(wire.get("error_code").is_some());
        assert_eq!(wire["status"], serde_json::json!("error"));
    }
}
