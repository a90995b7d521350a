// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stable wire-contract constants.
//!
//! Error codes are part of the trace contract: downstream tooling matches on
//! these exact strings, so they must never be renamed or reworded.

/// Version stamped on every emitted trace document.
pub const TRACE_VERSION: &str = "1.0";

/// The only AST wire version this engine accepts.
pub const AST_VERSION: &str = "1.0";

/// A task declared a consumed artifact that no upstream task has published.
pub const ARTIFACT_CONSUME_MISSING: &str = "ARTIFACT_CONSUME_MISSING";

/// A task's output is missing an artifact it declared in `produces`.
pub const ARTIFACT_OUTPUT_MISSING: &str = "ARTIFACT_OUTPUT_MISSING";

/// A consumed artifact's value does not satisfy the consumer's declared type.
pub const ARTIFACT_CONTRACT_CONSUME_VIOLATION: &str = "ARTIFACT_CONTRACT_CONSUME_VIOLATION";

/// A produced artifact's value does not satisfy the producer's declared type.
pub const ARTIFACT_CONTRACT_OUTPUT_VIOLATION: &str = "ARTIFACT_CONTRACT_OUTPUT_VIOLATION";

/// The worker input payload failed the task's input schema.
pub const CONTRACT_INPUT_VIOLATION: &str = "CONTRACT_INPUT_VIOLATION";

/// The worker output failed the task's output schema.
pub const CONTRACT_OUTPUT_VIOLATION: &str = "CONTRACT_OUTPUT_VIOLATION";

/// The dispatcher itself failed: unresolvable command, spawn error, or an
/// unexpected panic while running the task.
pub const RUNTIME_EXECUTION_FAILURE: &str = "RUNTIME_EXECUTION_FAILURE";

/// The worker reported ok but exited with a non-zero return code.
pub const WORKER_EXIT_NONZERO: &str = "WORKER_EXIT_NONZERO";

/// The worker wrote something to stdout that is not a JSON object.
pub const WORKER_OUTPUT_JSON_INVALID: &str = "WORKER_OUTPUT_JSON_INVALID";

/// The worker did not finish before the task's deadline.
pub const WORKER_TIMEOUT: &str = "WORKER_TIMEOUT";
