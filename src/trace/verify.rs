// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Terminal verify evaluation.
//!
//! Verify expressions see the shared context overlaid with the task results
//! (task name → result record, so `deploy.status == "ok"` and
//! `deploy.output.risk < 0.2` both work). Unlike constraints, an unresolved
//! name here is a hard failure.

use crate::eval::{eval_expr, truthy};
use crate::plan::program::VerifyCheck;
use crate::protocol::TaskResult;
use crate::trace::{CheckOutcome, VerifyFailure, VerifySummary};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Evaluate every verify check. Task results shadow context keys of the
/// same name.
pub fn evaluate_verify(
    checks: &[VerifyCheck],
    task_results: &HashMap<String, TaskResult>,
    context: &Map<String, Value>,
) -> Vec<CheckOutcome> {
    let mut environment = context.clone();
    for (name, result) in task_results {
        if let Ok(record) = serde_json::to_value(result) {
            environment.insert(name.clone(), record);
        }
    }

    checks
        .iter()
        .map(|check| match eval_expr(&check.expression, &environment) {
            Ok(value) => CheckOutcome {
                line: check.line,
                expression: check.expression.clone(),
                passed: Some(truthy(&value)),
                reason: None,
            },
            Err(error) => CheckOutcome {
                line: check.line,
                expression: check.expression.clone(),
                passed: Some(false),
                reason: Some(error.to_string()),
            },
        })
        .collect()
}

/// Tally a verify report. Anything not explicitly failed counts as passed.
pub fn summarize_verify(report: &[CheckOutcome]) -> VerifySummary {
    let failures: Vec<VerifyFailure> = report
        .iter()
        .filter(|outcome| outcome.passed == Some(false))
        .map(|outcome| VerifyFailure {
            line: outcome.line,
            expression: outcome.expression.clone(),
            reason: outcome.reason.clone(),
        })
        .collect();

    VerifySummary {
        total: report.len(),
        passed: report.len() - failures.len(),
        failed: failures.len(),
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TaskStatus;
    use serde_json::json;

    fn check(expression: &str) -> VerifyCheck {
        VerifyCheck {
            expression: expression.to_string(),
            line: 9,
        }
    }

    fn ok_result(name: &str, output: Value) -> TaskResult {
        TaskResult {
            task: name.to_string(),
            worker: format!("{name}.py"),
            status: TaskStatus::Ok,
            confidence: 0.9,
            output: output.as_object().unwrap().clone(),
            error_code: None,
            error: None,
            started_at: "t0".to_string(),
            finished_at: "t1".to_string(),
            provenance: Map::new(),
            stderr: None,
        }
    }

    #[test]
    fn verify_sees_task_results_and_context() {
        let mut results = HashMap::new();
        results.insert(
            "deploy".to_string(),
            ok_result("deploy", json!({"risk": 0.06})),
        );
        let mut context = Map::new();
        context.insert("risk".to_string(), json!(0.06));

        let report = evaluate_verify(
            &[
                check("deploy.status == \"ok\""),
                check("deploy.output.risk < 0.1"),
                check("risk < 0.1"),
            ],
            &results,
            &context,
        );
        assert!(report.iter().all(|outcome| outcome.passed == Some(true)));
    }

    #[test]
    fn task_results_shadow_context_keys() {
        let mut results = HashMap::new();
        results.insert("deploy".to_string(), ok_result("deploy", json!({})));
        let mut context = Map::new();
        context.insert("deploy".to_string(), json!("a string"));

        let report = evaluate_verify(&[check("deploy.status == \"ok\"")], &results, &context);
        assert_eq!(report[0].passed, Some(true));
    }

    #[test]
    fn unresolved_names_fail_hard() {
        let report = evaluate_verify(&[check("ghost == 1")], &HashMap::new(), &Map::new());
        assert_eq!(report[0].passed, Some(false));
        assert_eq!(report[0].reason.as_deref(), Some("unknown name: ghost"));
    }

    #[test]
    fn summary_tallies_failures_with_reasons() {
        let mut context = Map::new();
        context.insert("x".to_string(), json!(1));
        let report = evaluate_verify(
            &[check("x == 1"), check("x == 2"), check("ghost")],
            &HashMap::new(),
            &context,
        );
        let summary = summarize_verify(&report);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.failures[0].expression, "x == 2");
        assert!(summary.failures[0].reason.is_none());
        assert!(summary.failures[1].reason.is_some());
    }
}
