// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The validated abstract program: the engine's input data model.
//!
//! A [`Program`] is the in-memory form of the AST wire format. It carries the
//! goal, optional named field-spec types, numeric constraints, the task DAG,
//! and post-hoc verify expressions. Serialization round-trips the wire format:
//! fields holding their default values are omitted on output, so
//! parse→serialize is stable.
//!
//! `base_dir` is engine-side context (where relative worker paths resolve
//! from) and is never part of the wire document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One entry of an input/output contract or a named type: a dotted path that
/// must resolve in the payload, and the type its value must have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub path: String,
    /// One of `any`, `bool`, `str`, `int`, `float`, `number`, `dict`,
    /// `list`, `none`/`null`. Kept as written so serialization and error
    /// messages preserve the author's token.
    #[serde(rename = "type")]
    pub expected_type: String,
    #[serde(default)]
    pub optional: bool,
    /// Source-line provenance, used only in error messages.
    #[serde(default)]
    pub line: u64,
}

/// A numeric constraint on the final shared context: `key op value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub key: String,
    pub op: String,
    pub value: Value,
    #[serde(default)]
    pub line: u64,
}

/// A post-hoc verification expression, evaluated over the shared context and
/// the completed task results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyCheck {
    pub expression: String,
    #[serde(default)]
    pub line: u64,
}

/// A named unit of work bound to an external worker executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    /// Absolute path, or relative to the program's `base_dir`.
    pub worker: String,
    /// Capability grants this task needs at run time.
    #[serde(default)]
    pub requires: BTreeSet<String>,
    /// Names of predecessor tasks.
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub produces: Vec<String>,
    /// Artifact name → declared type token for consumed artifacts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub consumes_types: BTreeMap<String, String>,
    /// Artifact name → declared type token for produced artifacts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub produces_types: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    /// Additional attempts after the first; 0 means a single attempt.
    /// Signed so that invalid wire values reach the validator instead of
    /// failing deserialization.
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub retries: i64,
    /// Which failures are retried: `error`, `timeout`, or `worker_failure`.
    #[serde(default = "default_retry_if", skip_serializing_if = "is_default_retry_if")]
    pub retry_if: String,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub backoff_seconds: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub jitter_seconds: f64,
    #[serde(default)]
    pub input_schema: Vec<FieldSpec>,
    #[serde(default)]
    pub output_schema: Vec<FieldSpec>,
    #[serde(default)]
    pub line: u64,
}

impl Task {
    /// Total attempt budget for this task.
    pub fn max_attempts(&self) -> u32 {
        (self.retries.max(0) as u32) + 1
    }
}

/// The validated AST plus the engine-side base directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub ast_version: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub types: BTreeMap<String, Vec<FieldSpec>>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub verify: Vec<VerifyCheck>,
    /// Directory relative worker paths resolve against. Not part of the wire
    /// AST; set by the loader from the program file's location.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Program {
    /// Resolve a task's worker string to a filesystem path.
    pub fn resolve_worker(&self, worker: &str) -> PathBuf {
        let path = Path::new(worker);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// All task names, in declaration order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.name.as_str()).collect()
    }
}

pub const RETRY_IF_ERROR: &str = "error";
pub const RETRY_IF_TIMEOUT: &str = "timeout";
pub const RETRY_IF_WORKER_FAILURE: &str = "worker_failure";

fn default_retry_if() -> String {
    RETRY_IF_ERROR.to_string()
}

fn is_default_retry_if(value: &str) -> bool {
    value == RETRY_IF_ERROR
}

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_defaults_apply_when_fields_omitted() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "name": "lint",
            "worker": "workers/lint.py",
        }))
        .unwrap();

        assert!(task.requires.is_empty());
        assert!(task.after.is_empty());
        assert!(task.consumes.is_empty());
        assert_eq!(task.timeout_seconds, None);
        assert_eq!(task.retries, 0);
        assert_eq!(task.retry_if, RETRY_IF_ERROR);
        assert_eq!(task.backoff_seconds, 0.0);
        assert_eq!(task.jitter_seconds, 0.0);
        assert_eq!(task.max_attempts(), 1);
    }

    #[test]
    fn task_serialization_omits_default_fields() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "name": "lint",
            "worker": "workers/lint.py",
        }))
        .unwrap();

        let wire = serde_json::to_value(&task).unwrap();
        let object = wire.as_object().unwrap();
        assert!(!object.contains_key("consumes"));
        assert!(!object.contains_key("produces"));
        assert!(!object.contains_key("timeout_seconds"));
        assert!(!object.contains_key("retries"));
        assert!(!object.contains_key("retry_if"));
        assert!(!object.contains_key("backoff_seconds"));
        assert!(!object.contains_key("jitter_seconds"));
        assert!(object.contains_key("after"));
        assert!(object.contains_key("requires"));
    }

    #[test]
    fn resolve_worker_honors_absolute_paths() {
        let program = Program {
            base_dir: PathBuf::from("/plans"),
            ..empty_program()
        };
        assert_eq!(
            program.resolve_worker("/usr/bin/worker.py"),
            PathBuf::from("/usr/bin/worker.py")
        );
        assert_eq!(
            program.resolve_worker("workers/lint.py"),
            PathBuf::from("/plans/workers/lint.py")
        );
    }

    fn empty_program() -> Program {
        Program {
            ast_version: String::new(),
            goal: String::new(),
            types: BTreeMap::new(),
            constraints: Vec::new(),
            tasks: Vec::new(),
            verify: Vec::new(),
            base_dir: PathBuf::new(),
        }
    }
}
