// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The versioned trace document: everything the engine decided, in one JSON
//! object.
//!
//! The trace is the engine's only output. It lists the computed levels, the
//! flattened task order, every task result in execution order, and the
//! terminal constraint/verify reports. Partial runs (fail-stop) still emit a
//! structurally complete trace.

mod constraints;
mod verify;

pub use constraints::{constraint_expression, evaluate_constraints};
pub use verify::{evaluate_verify, summarize_verify};

use crate::protocol::TaskResult;
use serde::Serialize;

/// Overall run status: `ok` only when every executed task succeeded, no
/// constraint failed outright, and no verify check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
}

/// How the run was scheduled.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub mode: ExecutionMode,
    pub max_parallel: usize,
    pub levels: Vec<Vec<String>>,
}

/// Outcome of one constraint or verify expression. `passed` is `null` for
/// an unresolved constraint, which does not fail the run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub line: u64,
    pub expression: String,
    pub passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyFailure {
    pub line: u64,
    pub expression: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifySummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub failures: Vec<VerifyFailure>,
}

/// The whole trace document, wire version 1.0.
#[derive(Debug, Clone, Serialize)]
pub struct TraceDocument {
    pub trace_version: String,
    pub goal: String,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: String,
    pub capabilities: Vec<String>,
    pub execution: ExecutionReport,
    pub task_order: Vec<String>,
    pub tasks: Vec<TaskResult>,
    pub constraints: Vec<CheckOutcome>,
    pub verify: Vec<CheckOutcome>,
    pub verify_summary: VerifySummary,
}
