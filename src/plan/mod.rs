// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod levels;
mod loader;
pub mod program;
mod validation;

pub use levels::{build_execution_levels, build_execution_order, build_mermaid_graph, PlanError};
pub use loader::{load_program, parse_program, LoadError};
pub use program::{Constraint, FieldSpec, Program, Task, VerifyCheck};
pub use validation::validate_program;
