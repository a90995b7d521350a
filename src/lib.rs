// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod engine;        // level-wise plan execution
pub mod eval;          // safe expression evaluation
pub mod observability; // structured log messages
pub mod plan;          // program model, loading, validation, levels
pub mod protocol;      // task results + stable wire constants
pub mod schema;        // field-spec and typed-artifact checks
pub mod trace;         // trace document + terminal evaluators
pub mod traits;        // unified abstractions
pub mod worker;        // worker command resolution + backends
