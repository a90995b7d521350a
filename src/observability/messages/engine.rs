// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for run lifecycle and level dispatch events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A run passed validation and is about to execute.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ExecutionStarted<'a> {
    pub goal: &'a str,
    pub task_count: usize,
    pub mode: &'a str,
    pub max_parallel: usize,
}

impl Display for ExecutionStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting plan execution for goal '{}': {} tasks, {} mode, max_parallel={}",
            self.goal, self.task_count, self.mode, self.max_parallel
        )
    }
}

impl StructuredLog for ExecutionStarted<'_> {
    fn log(&self) {
        tracing::info!(
            goal = self.goal,
            task_count = self.task_count,
            mode = self.mode,
            max_parallel = self.max_parallel,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "execution",
            span_name = name,
            goal = self.goal,
            task_count = self.task_count,
            mode = self.mode,
        )
    }
}

/// One dependency level is being dispatched.
///
/// # Log Level
/// `debug!` - Routine scheduling detail
pub struct LevelDispatched {
    pub index: usize,
    pub task_count: usize,
}

impl Display for LevelDispatched {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching level {} with {} task(s)",
            self.index, self.task_count
        )
    }
}

impl StructuredLog for LevelDispatched {
    fn log(&self) {
        tracing::debug!(level = self.index, task_count = self.task_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "level",
            span_name = name,
            level = self.index,
            task_count = self.task_count,
        )
    }
}

/// A task ended non-ok; the run will stop after this level.
///
/// # Log Level
/// `warn!` - Degraded outcome worth attention
pub struct TaskFailed<'a> {
    pub task: &'a str,
    pub error_code: Option<&'a str>,
}

impl Display for TaskFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' failed with code {}",
            self.task,
            self.error_code.unwrap_or("<none>")
        )
    }
}

impl StructuredLog for TaskFailed<'_> {
    fn log(&self) {
        tracing::warn!(task = self.task, error_code = self.error_code, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "task_failed",
            span_name = name,
            task = self.task,
            error_code = self.error_code,
        )
    }
}

/// The run finished and a trace was assembled.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ExecutionCompleted<'a> {
    pub status: &'a str,
    pub task_count: usize,
    pub duration: std::time::Duration,
}

impl Display for ExecutionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Plan execution finished with status '{}': {} task(s) in {:?}",
            self.status, self.task_count, self.duration
        )
    }
}

impl StructuredLog for ExecutionCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            status = self.status,
            task_count = self.task_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "execution_completed",
            span_name = name,
            status = self.status,
            task_count = self.task_count,
        )
    }
}
