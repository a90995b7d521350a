// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The subprocess worker backend.
//!
//! One dispatch is one child process: the payload is written as a single
//! JSON document on the worker's stdin, stdin is closed, and stdout/stderr
//! are captured as UTF-8 (invalid bytes replaced). A per-task deadline kills
//! the child and classifies the attempt as `WORKER_TIMEOUT`, keeping
//! whatever output had been captured before the kill.
//!
//! Classification of a finished attempt:
//! * empty stdout: success iff the return code is 0
//! * non-empty stdout: must parse as a JSON object, else
//!   `WORKER_OUTPUT_JSON_INVALID`
//! * a worker claiming ok with a non-zero exit becomes `WORKER_EXIT_NONZERO`
//! * non-mapping `output` values are wrapped as `{"value": v}`, and
//!   `confidence` is coerced to a float (0.5/0.0 default by status)

use crate::plan::program::Task;
use crate::protocol::{codes, merge_error, TaskResult, TaskStatus};
use crate::traits::{Clock, Dispatcher, SystemClock};
use crate::worker::command::{resolve_worker_command, resolve_worker_path, shell_join};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Dispatcher that runs workers as child processes.
pub struct ProcessDispatcher {
    clock: Arc<dyn Clock>,
}

impl ProcessDispatcher {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for ProcessDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for ProcessDispatcher {
    async fn dispatch(
        &self,
        task: &Task,
        base_dir: &Path,
        payload: &Value,
        attempt: u32,
        max_attempts: u32,
    ) -> TaskResult {
        let resolved = resolve_worker_path(&task.worker, base_dir);
        let resolved_text = resolved.to_string_lossy().into_owned();

        let command = match resolve_worker_command(&task.worker, base_dir) {
            Ok(command) => command,
            Err(error) => {
                return TaskResult::runtime_failure(
                    task,
                    &resolved_text,
                    &error.to_string(),
                    self.clock.now_iso(),
                )
            }
        };

        let started_at = self.clock.now_iso();
        let capture = match run_attempt(&command, payload, task.timeout_seconds).await {
            Ok(capture) => capture,
            Err(error) => {
                return TaskResult::runtime_failure(
                    task,
                    &resolved_text,
                    &error.to_string(),
                    self.clock.now_iso(),
                )
            }
        };
        let finished_at = self.clock.now_iso();

        let parsed = if capture.timed_out {
            timeout_classification(task.timeout_seconds.unwrap_or_default())
        } else {
            classify_stdout(&capture.stdout, capture.return_code)
        };

        assemble_result(AttemptContext {
            task,
            command: &command,
            resolved_worker: &resolved_text,
            started_at,
            finished_at,
            stdout: &capture.stdout,
            stderr: &capture.stderr,
            return_code: capture.return_code,
            parsed,
            attempt,
            max_attempts,
        })
    }
}

struct AttemptCapture {
    stdout: String,
    stderr: String,
    return_code: Option<i64>,
    timed_out: bool,
}

async fn run_attempt(
    command: &[String],
    payload: &Value,
    timeout_seconds: Option<f64>,
) -> std::io::Result<AttemptCapture> {
    let mut child = Command::new(&command[0])
        .args(&command[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let payload_bytes = serde_json::to_vec(payload).unwrap_or_else(|_| b"{}".to_vec());
    if let Some(mut stdin) = child.stdin.take() {
        // A worker that exits without reading its stdin is fine; the exit
        // status decides the outcome.
        let _ = stdin.write_all(&payload_bytes).await;
        let _ = stdin.shutdown().await;
    }

    let stdout_pipe = child.stdout.take().expect("stdout is piped");
    let stderr_pipe = child.stderr.take().expect("stderr is piped");
    let stdout_reader = tokio::spawn(read_lossy(stdout_pipe));
    let stderr_reader = tokio::spawn(read_lossy(stderr_pipe));

    let (return_code, timed_out) = match timeout_seconds {
        Some(limit) => {
            match tokio::time::timeout(Duration::from_secs_f64(limit), child.wait()).await {
                Ok(status) => (status?.code().map(i64::from), false),
                Err(_) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    (None, true)
                }
            }
        }
        None => (child.wait().await?.code().map(i64::from), false),
    };

    let stdout = stdout_reader.await.unwrap_or_default();
    let stderr = stderr_reader.await.unwrap_or_default();

    Ok(AttemptCapture {
        stdout: stdout.trim().to_string(),
        stderr: stderr.trim().to_string(),
        return_code,
        timed_out,
    })
}

async fn read_lossy<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buffer = Vec::new();
    let _ = reader.read_to_end(&mut buffer).await;
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Interpret a finished worker's stdout.
pub(crate) fn classify_stdout(stdout: &str, return_code: Option<i64>) -> Map<String, Value> {
    if !stdout.is_empty() {
        return match serde_json::from_str::<Value>(stdout) {
            Ok(Value::Object(candidate)) => candidate,
            Ok(_) => invalid_output("worker output must be a JSON object".to_string()),
            Err(error) => invalid_output(format!("worker output is not valid JSON: {error}")),
        };
    }

    let succeeded = return_code == Some(0);
    let mut parsed = Map::new();
    parsed.insert(
        "status".to_string(),
        Value::from(if succeeded { "ok" } else { "error" }),
    );
    parsed.insert("output".to_string(), Value::Object(Map::new()));
    parsed.insert(
        "confidence".to_string(),
        Value::from(if succeeded { 0.5 } else { 0.0 }),
    );
    parsed
}

fn invalid_output(message: String) -> Map<String, Value> {
    let mut parsed = Map::new();
    parsed.insert("status".to_string(), Value::from("error"));
    parsed.insert("output".to_string(), Value::Object(Map::new()));
    parsed.insert("confidence".to_string(), Value::from(0.0));
    parsed.insert(
        "error_code".to_string(),
        Value::from(codes::WORKER_OUTPUT_JSON_INVALID),
    );
    parsed.insert("error".to_string(), Value::from(message));
    parsed
}

pub(crate) fn timeout_classification(timeout_seconds: f64) -> Map<String, Value> {
    let mut parsed = Map::new();
    parsed.insert("status".to_string(), Value::from("error"));
    parsed.insert("output".to_string(), Value::Object(Map::new()));
    parsed.insert("confidence".to_string(), Value::from(0.0));
    parsed.insert("error_code".to_string(), Value::from(codes::WORKER_TIMEOUT));
    parsed.insert(
        "error".to_string(),
        Value::from(format!("worker timed out after {timeout_seconds}s")),
    );
    parsed
}

pub(crate) struct AttemptContext<'a> {
    pub task: &'a Task,
    pub command: &'a [String],
    pub resolved_worker: &'a str,
    pub started_at: String,
    pub finished_at: String,
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub return_code: Option<i64>,
    pub parsed: Map<String, Value>,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Fold a classified attempt into a [`TaskResult`], applying the exit-code
/// override, output wrapping, confidence coercion, and provenance assembly.
pub(crate) fn assemble_result(context: AttemptContext<'_>) -> TaskResult {
    let mut parsed = context.parsed;

    let claimed_ok = parsed.get("status").and_then(Value::as_str) == Some("ok");
    let exit_nonzero = matches!(context.return_code, Some(code) if code != 0);
    if claimed_ok && exit_nonzero {
        parsed.insert("status".to_string(), Value::from("error"));
        parsed.insert(
            "error_code".to_string(),
            Value::from(codes::WORKER_EXIT_NONZERO),
        );
        let appended = format!(
            "worker exited with return code {}",
            context.return_code.unwrap_or_default()
        );
        let existing = parsed
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);
        parsed.insert(
            "error".to_string(),
            Value::from(merge_error(existing, &appended)),
        );
    }

    let status = if parsed.get("status").and_then(Value::as_str) == Some("ok") {
        TaskStatus::Ok
    } else {
        TaskStatus::Error
    };

    let output = match parsed.get("output") {
        Some(Value::Object(entries)) => entries.clone(),
        other => {
            let mut wrapped = Map::new();
            wrapped.insert(
                "value".to_string(),
                other.cloned().unwrap_or(Value::Null),
            );
            wrapped
        }
    };

    let confidence = match parsed.get("confidence") {
        Some(value) => coerce_confidence(value),
        None => {
            if status.is_ok() {
                0.5
            } else {
                0.0
            }
        }
    };

    let mut provenance = match parsed.get("provenance") {
        Some(Value::Object(entries)) => entries.clone(),
        _ => Map::new(),
    };
    provenance.insert("worker".to_string(), Value::from(context.resolved_worker));
    provenance.insert(
        "command".to_string(),
        Value::from(shell_join(context.command)),
    );
    provenance.insert(
        "return_code".to_string(),
        context.return_code.map(Value::from).unwrap_or(Value::Null),
    );
    provenance.insert(
        "stdout_sha256".to_string(),
        Value::from(hex::encode(Sha256::digest(context.stdout.as_bytes()))),
    );
    if context.max_attempts > 1 {
        provenance.insert("attempt".to_string(), Value::from(context.attempt));
        provenance.insert("max_attempts".to_string(), Value::from(context.max_attempts));
    }
    if let Some(timeout) = context.task.timeout_seconds {
        provenance.insert("timeout_seconds".to_string(), Value::from(timeout));
    }
    if context.task.retries > 0 {
        provenance.insert("retries".to_string(), Value::from(context.task.retries));
    }
    if context.task.backoff_seconds > 0.0 {
        provenance.insert(
            "backoff_seconds".to_string(),
            Value::from(context.task.backoff_seconds),
        );
    }
    if !context.task.consumes.is_empty() {
        provenance.insert(
            "consumes".to_string(),
            Value::from(context.task.consumes.clone()),
        );
    }
    if !context.task.produces.is_empty() {
        provenance.insert(
            "produces".to_string(),
            Value::from(context.task.produces.clone()),
        );
    }

    TaskResult {
        task: context.task.name.clone(),
        worker: context.task.worker.clone(),
        status,
        confidence,
        output,
        error_code: parsed
            .get("error_code")
            .and_then(Value::as_str)
            .map(str::to_string),
        error: parsed
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string),
        started_at: context.started_at,
        finished_at: context.finished_at,
        provenance,
        stderr: if context.stderr.is_empty() {
            None
        } else {
            Some(context.stderr.to_string())
        },
    }
}

fn coerce_confidence(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::String(text) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}
