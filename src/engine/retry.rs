// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The per-task attempt loop.
//!
//! A task gets `retries + 1` attempts. After a failed attempt the
//! `retry_if` filter decides whether the failure class is worth retrying;
//! between attempts the controller sleeps
//! `backoff · 2^(attempt-1) + uniform(0, jitter)`.
//!
//! Jitter draws come from a generator owned by this task alone: with an
//! engine seed it is derived from `(seed, task name)`, so identical runs
//! produce identical delays, and no two tasks ever share a generator.

use crate::plan::program::{Task, RETRY_IF_TIMEOUT, RETRY_IF_WORKER_FAILURE};
use crate::protocol::{codes, AttemptRecord, TaskResult};
use crate::traits::Dispatcher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

/// Drive one task through its attempt budget and return the terminal
/// result, with the attempt history folded into provenance when more than
/// one attempt was possible.
pub async fn run_task<D: Dispatcher + ?Sized>(
    dispatcher: &D,
    task: &Task,
    base_dir: &Path,
    payload: &Value,
    retry_seed: Option<u64>,
) -> TaskResult {
    let max_attempts = task.max_attempts();
    let filter = RetryFilter::for_task(task);
    let mut rng = task_rng(retry_seed, &task.name);
    let mut history: Vec<AttemptRecord> = Vec::new();

    let mut attempt = 1u32;
    let mut result = loop {
        let result = dispatcher
            .dispatch(task, base_dir, payload, attempt, max_attempts)
            .await;
        history.push(result.attempt_record(attempt));

        if result.status.is_ok() || !filter.should_retry(&result) || attempt == max_attempts {
            break result;
        }

        let delay = backoff_delay(task.backoff_seconds, attempt)
            + jitter_draw(&mut rng, task.jitter_seconds);
        if delay > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
        attempt += 1;
    };

    if max_attempts > 1 {
        result.provenance.insert(
            "attempts".to_string(),
            serde_json::to_value(&history).unwrap_or(Value::Null),
        );
        result
            .provenance
            .insert("attempt".to_string(), Value::from(attempt));
        result
            .provenance
            .insert("max_attempts".to_string(), Value::from(max_attempts));
        if let Some(seed) = retry_seed {
            result
                .provenance
                .insert("retry_seed".to_string(), Value::from(seed));
        }
    }

    result
}

/// Which failure classes are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryFilter {
    /// Any non-ok attempt, including engine-synthesized contract failures.
    Error,
    /// Only deadline expiries.
    Timeout,
    /// Only worker-side breakage: bad exit, bad output, dispatcher failure.
    WorkerFailure,
}

impl RetryFilter {
    fn for_task(task: &Task) -> Self {
        match task.retry_if.as_str() {
            RETRY_IF_TIMEOUT => RetryFilter::Timeout,
            RETRY_IF_WORKER_FAILURE => RetryFilter::WorkerFailure,
            // The validator has already rejected anything else.
            _ => RetryFilter::Error,
        }
    }

    fn should_retry(self, result: &TaskResult) -> bool {
        let code = result.error_code.as_deref();
        match self {
            RetryFilter::Error => true,
            RetryFilter::Timeout => code == Some(codes::WORKER_TIMEOUT),
            RetryFilter::WorkerFailure => matches!(
                code,
                Some(codes::WORKER_EXIT_NONZERO)
                    | Some(codes::WORKER_OUTPUT_JSON_INVALID)
                    | Some(codes::RUNTIME_EXECUTION_FAILURE)
            ),
        }
    }
}

fn backoff_delay(backoff_seconds: f64, attempt: u32) -> f64 {
    if backoff_seconds <= 0.0 {
        return 0.0;
    }
    backoff_seconds * 2f64.powi(attempt as i32 - 1)
}

fn jitter_draw(rng: &mut StdRng, jitter_seconds: f64) -> f64 {
    if jitter_seconds <= 0.0 {
        return 0.0;
    }
    rng.gen_range(0.0..jitter_seconds)
}

fn task_rng(retry_seed: Option<u64>, task_name: &str) -> StdRng {
    match retry_seed {
        Some(seed) => {
            let mut hasher = Sha256::new();
            hasher.update(seed.to_be_bytes());
            hasher.update(task_name.as_bytes());
            let digest = hasher.finalize();
            let mut word = [0u8; 8];
            word.copy_from_slice(&digest[..8]);
            StdRng::seed_from_u64(u64::from_be_bytes(word))
        }
        None => StdRng::from_entropy(),
    }
}
