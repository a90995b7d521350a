// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Safe expression evaluation for constraints and verify checks.
//!
//! The grammar is a deliberately small slice of expression syntax: literals,
//! names from a caller-supplied environment, attribute and subscript access,
//! sign and `not`, the five arithmetic operators, chained comparisons, and
//! short-circuit `and`/`or`. Nothing in it can perform I/O, call functions,
//! or mutate state, which is what makes it safe to run over untrusted plan
//! text.

mod interp;
mod lexer;
mod parser;

pub use interp::truthy;
pub use parser::Expr;

use serde_json::{Map, Value};
use thiserror::Error;

/// Why an expression failed to parse or evaluate.
///
/// `Syntax` carries the whole source expression (the surface text is the
/// most useful diagnostic); the remaining variants mirror the evaluator's
/// runtime failure modes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("invalid expression syntax: {0}")]
    Syntax(String),

    #[error("unknown name: {0}")]
    UnknownName(String),

    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("cannot resolve attribute '{0}'")]
    UnresolvedAttribute(String),

    #[error("invalid subscript operation")]
    InvalidSubscript,

    #[error("{0}")]
    Unsupported(String),
}

/// Parse an expression without evaluating it. Used by the static validator
/// to reject malformed verify expressions before execution.
pub fn parse_expression(expression: &str) -> Result<Expr, EvalError> {
    let tokens =
        lexer::tokenize(expression).map_err(|_| EvalError::Syntax(expression.to_string()))?;
    parser::parse(&tokens).map_err(|_| EvalError::Syntax(expression.to_string()))
}

/// Evaluate an expression against a name environment.
pub fn eval_expr(expression: &str, context: &Map<String, Value>) -> Result<Value, EvalError> {
    let expr = parse_expression(expression)?;
    interp::evaluate(&expr, context)
}
