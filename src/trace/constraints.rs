// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Terminal constraint evaluation.
//!
//! A constraint whose key never appeared in the shared context is
//! *unresolved*: it reports `passed: null` and does not fail the run. A
//! constraint that resolves and evaluates false fails the run, as does one
//! whose synthesized expression cannot be evaluated.

use crate::eval::{eval_expr, truthy};
use crate::plan::program::Constraint;
use crate::trace::CheckOutcome;
use serde_json::{Map, Value};

/// The expression a constraint evaluates as: `<key> <op> <json value>`.
pub fn constraint_expression(constraint: &Constraint) -> String {
    let value = serde_json::to_string(&constraint.value).unwrap_or_else(|_| "null".to_string());
    format!("{} {} {}", constraint.key, constraint.op, value)
}

/// Evaluate every constraint against the final shared context.
pub fn evaluate_constraints(
    constraints: &[Constraint],
    context: &Map<String, Value>,
) -> Vec<CheckOutcome> {
    constraints
        .iter()
        .map(|constraint| {
            let expression = constraint_expression(constraint);
            if !context.contains_key(&constraint.key) {
                return CheckOutcome {
                    line: constraint.line,
                    expression,
                    passed: None,
                    reason: Some(format!("unresolved key: {}", constraint.key)),
                };
            }
            match eval_expr(&expression, context) {
                Ok(value) => CheckOutcome {
                    line: constraint.line,
                    expression,
                    passed: Some(truthy(&value)),
                    reason: None,
                },
                Err(error) => CheckOutcome {
                    line: constraint.line,
                    expression,
                    passed: Some(false),
                    reason: Some(error.to_string()),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constraint(key: &str, op: &str, value: Value) -> Constraint {
        Constraint {
            key: key.to_string(),
            op: op.to_string(),
            value,
            line: 4,
        }
    }

    fn context(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn resolved_constraints_evaluate_against_the_context() {
        let report = evaluate_constraints(
            &[
                constraint("risk", "<=", json!(0.2)),
                constraint("coverage", ">=", json!(0.95)),
            ],
            &context(json!({"risk": 0.12, "coverage": 0.94})),
        );

        assert_eq!(report[0].passed, Some(true));
        assert!(report[0].reason.is_none());
        assert_eq!(report[0].expression, "risk <= 0.2");
        assert_eq!(report[1].passed, Some(false));
    }

    #[test]
    fn unresolved_key_is_soft() {
        let report = evaluate_constraints(
            &[constraint("risk", "<=", json!(0.2))],
            &Map::new(),
        );
        assert_eq!(report[0].passed, None);
        assert_eq!(report[0].reason.as_deref(), Some("unresolved key: risk"));
    }

    #[test]
    fn evaluation_errors_fail_the_constraint() {
        // String value against a numeric key: the comparison is undefined.
        let report = evaluate_constraints(
            &[constraint("risk", "<", json!("low"))],
            &context(json!({"risk": 0.12})),
        );
        assert_eq!(report[0].passed, Some(false));
        assert!(report[0].reason.is_some());
        assert_eq!(report[0].expression, "risk < \"low\"");
    }

    #[test]
    fn string_values_round_trip_through_json_encoding() {
        let report = evaluate_constraints(
            &[constraint("channel", "==", json!("stable"))],
            &context(json!({"channel": "stable"})),
        );
        assert_eq!(report[0].passed, Some(true));
    }
}
