// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stub dispatcher implementations for testing the engine and the retry
//! controller without real child processes.
//!
//! `ScriptedDispatcher` plays back canned attempt outcomes per task (and per
//! attempt number, for retry scenarios) and records every dispatch call so
//! tests can assert on payloads, attempt counts, and concurrency.

use crate::plan::program::Task;
use crate::protocol::{TaskResult, TaskStatus};
use crate::traits::Dispatcher;
use crate::worker::command::resolve_worker_path;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

type Behavior = Box<dyn Fn(u32) -> CannedAttempt + Send + Sync>;

/// One scripted attempt outcome.
#[derive(Debug, Clone)]
pub struct CannedAttempt {
    pub status: TaskStatus,
    pub output: Map<String, Value>,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub confidence: f64,
}

impl CannedAttempt {
    pub fn ok(output: Value) -> Self {
        Self {
            status: TaskStatus::Ok,
            output: output.as_object().cloned().unwrap_or_default(),
            error_code: None,
            error: None,
            confidence: 0.9,
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            status: TaskStatus::Error,
            output: Map::new(),
            error_code: Some(code.to_string()),
            error: Some(message.to_string()),
            confidence: 0.0,
        }
    }
}

/// A dispatch invocation observed by the stub.
#[derive(Debug, Clone)]
pub struct DispatchCall {
    pub task: String,
    pub attempt: u32,
    pub payload: Value,
}

/// Table-driven dispatcher: each task name maps to a function from attempt
/// number to a canned outcome. Tasks without an entry succeed with an empty
/// output.
#[derive(Default)]
pub struct ScriptedDispatcher {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<Vec<DispatchCall>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task always succeeds with the given output object.
    pub fn ok_task(mut self, name: &str, output: Value) -> Self {
        let canned = CannedAttempt::ok(output);
        self.behaviors
            .insert(name.to_string(), Box::new(move |_| canned.clone()));
        self
    }

    /// Task always fails with the given code and message.
    pub fn failing_task(mut self, name: &str, code: &str, message: &str) -> Self {
        let canned = CannedAttempt::error(code, message);
        self.behaviors
            .insert(name.to_string(), Box::new(move |_| canned.clone()));
        self
    }

    /// Task fails `failures` times with `code`, then succeeds with `output`.
    pub fn flaky_task(mut self, name: &str, failures: u32, code: &str, output: Value) -> Self {
        let code = code.to_string();
        let success = CannedAttempt::ok(output);
        self.behaviors.insert(
            name.to_string(),
            Box::new(move |attempt| {
                if attempt <= failures {
                    CannedAttempt::error(&code, &format!("simulated failure #{attempt}"))
                } else {
                    success.clone()
                }
            }),
        );
        self
    }

    /// Full control: map attempt number to an outcome.
    pub fn scripted_task(
        mut self,
        name: &str,
        behavior: impl Fn(u32) -> CannedAttempt + Send + Sync + 'static,
    ) -> Self {
        self.behaviors.insert(name.to_string(), Box::new(behavior));
        self
    }

    /// Every dispatch call seen so far, in arrival order.
    pub fn calls(&self) -> Vec<DispatchCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Attempt count for one task.
    pub fn attempts_for(&self, name: &str) -> u32 {
        self.calls()
            .iter()
            .filter(|call| call.task == name)
            .count() as u32
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(
        &self,
        task: &Task,
        base_dir: &Path,
        payload: &Value,
        attempt: u32,
        _max_attempts: u32,
    ) -> TaskResult {
        self.calls.lock().expect("calls lock").push(DispatchCall {
            task: task.name.clone(),
            attempt,
            payload: payload.clone(),
        });

        let canned = match self.behaviors.get(&task.name) {
            Some(behavior) => behavior(attempt),
            None => CannedAttempt::ok(Value::Object(Map::new())),
        };

        let mut provenance = Map::new();
        provenance.insert(
            "worker".to_string(),
            Value::from(
                resolve_worker_path(&task.worker, base_dir)
                    .to_string_lossy()
                    .into_owned(),
            ),
        );

        TaskResult {
            task: task.name.clone(),
            worker: task.worker.clone(),
            status: canned.status,
            confidence: canned.confidence,
            output: canned.output,
            error_code: canned.error_code,
            error: canned.error,
            started_at: format!("attempt-{attempt}-start"),
            finished_at: format!("attempt-{attempt}-end"),
            provenance,
            stderr: None,
        }
    }
}
