// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The plan execution engine.
//!
//! Execution walks the planner's levels in order. Each level goes through
//! three phases:
//!
//! 1. **Pre-dispatch** (declaration order): check consumed artifacts are in
//!    the registry, build the worker payload, and enforce the input
//!    contract. A failure here synthesizes a TaskResult without dispatching
//!    anything and aborts the run at the end of the level.
//! 2. **Dispatch**: run the level's tasks through the retry controller,
//!    concurrently when parallel execution is enabled and the level has more
//!    than one task. A task body that dies unexpectedly becomes a
//!    `RUNTIME_EXECUTION_FAILURE` result rather than a crash.
//! 3. **Post-dispatch** (declaration order, single-threaded): enforce the
//!    output contract and typed-artifact contracts, publish artifacts,
//!    absorb output keys into the shared context, and append to the trace.
//!    Any non-ok result stops later levels; the level barrier is strict.
//!
//! The registry and shared context are only touched during the
//! single-threaded phases, so no locking is needed: dispatch results are
//! gathered before any state mutation.
//!
//! After the last level (or the fail-stop), constraints and verify checks
//! run over the final context and the trace document is assembled. The
//! overall status is `ok` only if every recorded task is ok, no constraint
//! is explicitly false (unresolved is soft), and no verify check failed.

use crate::engine::retry;
use crate::observability::messages::engine::{
    ExecutionCompleted, ExecutionStarted, LevelDispatched, TaskFailed,
};
use crate::observability::messages::validation::ProgramRejected;
use crate::observability::messages::StructuredLog;
use crate::plan::program::{Program, Task};
use crate::plan::{build_execution_levels, validate_program};
use crate::protocol::{codes, TaskResult};
use crate::schema::{artifact_type_errors, validate_schema};
use crate::trace::{
    evaluate_constraints, evaluate_verify, summarize_verify, ExecutionMode, ExecutionReport,
    RunStatus, TraceDocument,
};
use crate::traits::{Clock, Dispatcher, SystemClock};
use crate::worker::{resolve_worker_path, ProcessDispatcher};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Run-level configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Capability grants for this run; tasks' `requires` must be covered.
    pub capabilities: BTreeSet<String>,
    /// Seed values for the shared context.
    pub variables: Map<String, Value>,
    /// Dispatch a level's tasks concurrently when it has more than one.
    pub parallel: bool,
    /// Upper bound on concurrent workers within a level.
    pub max_parallel: usize,
    /// Seed for deterministic retry jitter; `None` draws from entropy.
    pub retry_seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            capabilities: BTreeSet::new(),
            variables: Map::new(),
            parallel: true,
            max_parallel: 4,
            retry_seed: None,
        }
    }
}

/// Why a run never started. Runtime failures never surface here; they are
/// folded into TaskResults inside the trace.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("max_parallel must be >= 1")]
    InvalidParallelism,

    #[error("{}", .errors.join("\n"))]
    Rejected { errors: Vec<String> },
}

/// The run-scoped engine. All state lives per `execute` call; the engine
/// itself only holds its collaborators.
pub struct Engine<D: Dispatcher + 'static> {
    dispatcher: Arc<D>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
}

impl Engine<ProcessDispatcher> {
    /// Engine with the real subprocess backend.
    pub fn new(options: EngineOptions) -> Self {
        Self::with_dispatcher(Arc::new(ProcessDispatcher::new()), options)
    }
}

impl<D: Dispatcher + 'static> Engine<D> {
    pub fn with_dispatcher(dispatcher: Arc<D>, options: EngineOptions) -> Self {
        Self {
            dispatcher,
            clock: Arc::new(SystemClock),
            options,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate and execute a program, producing its trace.
    pub async fn execute(&self, program: &Program) -> Result<TraceDocument, ExecutionError> {
        if self.options.max_parallel < 1 {
            return Err(ExecutionError::InvalidParallelism);
        }

        let errors = validate_program(program, Some(&self.options.capabilities));
        if !errors.is_empty() {
            ProgramRejected {
                error_count: errors.len(),
            }
            .log();
            return Err(ExecutionError::Rejected { errors });
        }

        // Validation has already rejected cycles; this cannot fail now.
        let levels = build_execution_levels(&program.tasks)
            .map_err(|error| ExecutionError::Rejected {
                errors: vec![error.to_string()],
            })?;
        let task_order: Vec<String> = levels.iter().flatten().cloned().collect();

        let mode = if self.options.parallel && self.options.max_parallel > 1 {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };
        let mode_label = match mode {
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Sequential => "sequential",
        };
        ExecutionStarted {
            goal: &program.goal,
            task_count: program.tasks.len(),
            mode: mode_label,
            max_parallel: self.options.max_parallel,
        }
        .log();

        let task_index: HashMap<&str, &Task> = program
            .tasks
            .iter()
            .map(|task| (task.name.as_str(), task))
            .collect();
        let task_names: HashSet<&str> = task_index.keys().copied().collect();

        let started_at = self.clock.now_iso();
        let run_started = std::time::Instant::now();
        let mut state = RunState::new(self.options.variables.clone());

        for (level_index, level) in levels.iter().enumerate() {
            LevelDispatched {
                index: level_index,
                task_count: level.len(),
            }
            .log();

            let payloads = self.pre_dispatch(program, level, &task_index, &mut state);
            let Some(payloads) = payloads else {
                break; // input_failed: the failure is already in the trace
            };

            let results = self.dispatch_level(program, &task_index, &payloads).await;
            let level_failed =
                self.post_dispatch(program, &payloads, results, &task_index, &task_names, &mut state);

            if level_failed {
                break;
            }
        }

        let constraints_report = evaluate_constraints(&program.constraints, &state.shared_context);
        let verify_report =
            evaluate_verify(&program.verify, &state.task_results, &state.shared_context);
        let verify_summary = summarize_verify(&verify_report);

        let tasks_ok = state.trace_tasks.iter().all(|result| result.status.is_ok());
        let constraints_ok = constraints_report
            .iter()
            .all(|outcome| outcome.passed != Some(false));
        let verify_ok = verify_summary.failed == 0;
        let status = if tasks_ok && constraints_ok && verify_ok {
            RunStatus::Ok
        } else {
            RunStatus::Failed
        };

        ExecutionCompleted {
            status: match status {
                RunStatus::Ok => "ok",
                RunStatus::Failed => "failed",
            },
            task_count: state.trace_tasks.len(),
            duration: run_started.elapsed(),
        }
        .log();

        Ok(TraceDocument {
            trace_version: codes::TRACE_VERSION.to_string(),
            goal: program.goal.clone(),
            status,
            started_at,
            finished_at: self.clock.now_iso(),
            capabilities: self.options.capabilities.iter().cloned().collect(),
            execution: ExecutionReport {
                mode,
                max_parallel: if self.options.parallel {
                    self.options.max_parallel
                } else {
                    1
                },
                levels,
            },
            task_order,
            tasks: state.trace_tasks,
            constraints: constraints_report,
            verify: verify_report,
            verify_summary,
        })
    }

    /// Phase 1: artifact availability, payload construction, input
    /// contracts. Returns `None` when the level (and therefore the run)
    /// must abort; the synthesized failure is already recorded.
    fn pre_dispatch(
        &self,
        program: &Program,
        level: &[String],
        task_index: &HashMap<&str, &Task>,
        state: &mut RunState,
    ) -> Option<Vec<(String, Value)>> {
        let mut payloads = Vec::with_capacity(level.len());

        for name in level {
            let task = task_index[name.as_str()];

            let missing: Vec<String> = task
                .consumes
                .iter()
                .filter(|artifact| !state.artifact_registry.contains_key(*artifact))
                .cloned()
                .collect();
            if !missing.is_empty() {
                let failure = TaskResult::artifact_consume_missing(
                    task,
                    &resolved_worker_text(program, task),
                    &missing,
                    self.clock.now_iso(),
                );
                state.record(failure);
                return None;
            }

            let payload = self.build_payload(program, task, state);
            let input_errors = validate_schema(&payload, &task.input_schema);
            if !input_errors.is_empty() {
                let failure = TaskResult::contract_input_violation(
                    task,
                    &resolved_worker_text(program, task),
                    &input_errors,
                    self.clock.now_iso(),
                );
                state.record(failure);
                return None;
            }

            payloads.push((name.clone(), payload));
        }

        Some(payloads)
    }

    /// The single JSON document a worker reads on stdin.
    fn build_payload(&self, program: &Program, task: &Task, state: &RunState) -> Value {
        let mut dependencies = Map::new();
        for dependency in &task.after {
            if let Some(result) = state.task_results.get(dependency) {
                if let Ok(record) = serde_json::to_value(result) {
                    dependencies.insert(dependency.clone(), record);
                }
            }
        }

        let mut artifacts = Map::new();
        for artifact in &task.consumes {
            if let Some(value) = state.artifact_registry.get(artifact) {
                artifacts.insert(artifact.clone(), value.clone());
            }
        }

        let mut payload = Map::new();
        payload.insert("task".to_string(), Value::from(task.name.clone()));
        payload.insert("goal".to_string(), Value::from(program.goal.clone()));
        payload.insert(
            "constraints".to_string(),
            serde_json::to_value(&program.constraints).unwrap_or_else(|_| Value::Array(Vec::new())),
        );
        payload.insert("dependencies".to_string(), Value::Object(dependencies));
        payload.insert("artifacts".to_string(), Value::Object(artifacts));
        payload.insert(
            "variables".to_string(),
            Value::Object(state.shared_context.clone()),
        );
        Value::Object(payload)
    }

    /// Phase 2: run the level's tasks, gathering every result before any
    /// shared state is touched.
    async fn dispatch_level(
        &self,
        program: &Program,
        task_index: &HashMap<&str, &Task>,
        payloads: &[(String, Value)],
    ) -> HashMap<String, TaskResult> {
        if self.options.parallel && payloads.len() > 1 && self.options.max_parallel > 1 {
            self.run_level_parallel(program, task_index, payloads).await
        } else {
            self.run_level_sequential(program, task_index, payloads)
                .await
        }
    }

    async fn run_level_parallel(
        &self,
        program: &Program,
        task_index: &HashMap<&str, &Task>,
        payloads: &[(String, Value)],
    ) -> HashMap<String, TaskResult> {
        let workers = self.options.max_parallel.min(payloads.len());
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut handles = Vec::with_capacity(payloads.len());
        for (name, payload) in payloads {
            let task = Arc::new(task_index[name.as_str()].clone());
            let dispatcher = Arc::clone(&self.dispatcher);
            let semaphore = Arc::clone(&semaphore);
            let base_dir = program.base_dir.clone();
            let payload = payload.clone();
            let retry_seed = self.options.retry_seed;

            let run_task = {
                let task = Arc::clone(&task);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closes");
                    retry::run_task(dispatcher.as_ref(), &task, &base_dir, &payload, retry_seed)
                        .await
                })
            };
            handles.push((name.clone(), task, run_task));
        }

        let mut results = HashMap::with_capacity(handles.len());
        for (name, task, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => TaskResult::runtime_failure(
                    &task,
                    &resolved_worker_text(program, &task),
                    &join_error.to_string(),
                    self.clock.now_iso(),
                ),
            };
            results.insert(name, result);
        }
        results
    }

    async fn run_level_sequential(
        &self,
        program: &Program,
        task_index: &HashMap<&str, &Task>,
        payloads: &[(String, Value)],
    ) -> HashMap<String, TaskResult> {
        let mut results = HashMap::with_capacity(payloads.len());
        for (name, payload) in payloads {
            let task = Arc::new(task_index[name.as_str()].clone());
            let dispatcher = Arc::clone(&self.dispatcher);
            let base_dir = program.base_dir.clone();
            let payload = payload.clone();
            let retry_seed = self.options.retry_seed;

            let handle = {
                let task = Arc::clone(&task);
                tokio::spawn(async move {
                    retry::run_task(dispatcher.as_ref(), &task, &base_dir, &payload, retry_seed)
                        .await
                })
            };
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => TaskResult::runtime_failure(
                    &task,
                    &resolved_worker_text(program, &task),
                    &join_error.to_string(),
                    self.clock.now_iso(),
                ),
            };
            results.insert(name.clone(), result);
        }
        results
    }

    /// Phase 3: contracts, artifact publication, context absorption, trace
    /// recording. Returns whether the level failed.
    fn post_dispatch(
        &self,
        program: &Program,
        payloads: &[(String, Value)],
        mut results: HashMap<String, TaskResult>,
        task_index: &HashMap<&str, &Task>,
        task_names: &HashSet<&str>,
        state: &mut RunState,
    ) -> bool {
        let mut level_failed = false;

        for (name, _) in payloads {
            let task = task_index[name.as_str()];
            let mut result = match results.remove(name) {
                Some(result) => result,
                None => TaskResult::runtime_failure(
                    task,
                    &resolved_worker_text(program, task),
                    "dispatcher returned no result",
                    self.clock.now_iso(),
                ),
            };

            let output_value = Value::Object(result.output.clone());
            let output_errors = validate_schema(&output_value, &task.output_schema);
            if !output_errors.is_empty() {
                result.mark_failed(
                    codes::CONTRACT_OUTPUT_VIOLATION,
                    format!("output contract violation: {}", output_errors.join("; ")),
                );
            }

            if result.status.is_ok() {
                let missing: Vec<String> = task
                    .produces
                    .iter()
                    .filter(|artifact| !result.output.contains_key(*artifact))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    result.mark_failed(
                        codes::ARTIFACT_OUTPUT_MISSING,
                        format!(
                            "declared produced artifact(s) missing from output: {}",
                            missing.join(", ")
                        ),
                    );
                }
            }

            if result.status.is_ok() {
                for artifact in &task.produces {
                    if let Some(token) = task.produces_types.get(artifact) {
                        let violations =
                            artifact_type_errors(&result.output[artifact], token, &program.types);
                        if !violations.is_empty() {
                            result.mark_failed(
                                codes::ARTIFACT_CONTRACT_OUTPUT_VIOLATION,
                                format!(
                                    "produced artifact '{}' violates declared type '{}': {}",
                                    artifact,
                                    token,
                                    violations.join("; ")
                                ),
                            );
                            break;
                        }
                    }
                }
            }

            if result.status.is_ok() {
                for artifact in &task.consumes {
                    if let Some(token) = task.consumes_types.get(artifact) {
                        let value = state
                            .artifact_registry
                            .get(artifact)
                            .cloned()
                            .unwrap_or(Value::Null);
                        let violations = artifact_type_errors(&value, token, &program.types);
                        if !violations.is_empty() {
                            result.mark_failed(
                                codes::ARTIFACT_CONTRACT_CONSUME_VIOLATION,
                                format!(
                                    "consumed artifact '{}' violates declared type '{}': {}",
                                    artifact,
                                    token,
                                    violations.join("; ")
                                ),
                            );
                            break;
                        }
                    }
                }
            }

            if result.status.is_ok() {
                for artifact in &task.produces {
                    state
                        .artifact_registry
                        .insert(artifact.clone(), result.output[artifact].clone());
                }
                // Output keys colliding with any task name in the program
                // never shadow a task record in the evaluation context.
                for (key, value) in &result.output {
                    if !task_names.contains(key.as_str()) {
                        state.shared_context.insert(key.clone(), value.clone());
                    }
                }
            } else {
                level_failed = true;
                TaskFailed {
                    task: &result.task,
                    error_code: result.error_code.as_deref(),
                }
                .log();
            }

            state.record(result);
        }

        level_failed
    }
}

/// Mutable state for one run.
struct RunState {
    task_results: HashMap<String, TaskResult>,
    trace_tasks: Vec<TaskResult>,
    shared_context: Map<String, Value>,
    artifact_registry: Map<String, Value>,
}

impl RunState {
    fn new(variables: Map<String, Value>) -> Self {
        Self {
            task_results: HashMap::new(),
            trace_tasks: Vec::new(),
            shared_context: variables,
            artifact_registry: Map::new(),
        }
    }

    fn record(&mut self, result: TaskResult) {
        self.task_results
            .insert(result.task.clone(), result.clone());
        self.trace_tasks.push(result);
    }
}

fn resolved_worker_text(program: &Program, task: &Task) -> String {
    resolve_worker_path(&task.worker, &program.base_dir)
        .to_string_lossy()
        .into_owned()
}
