// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Loading the AST wire format: a JSON document with `ast_version: "1.0"`,
//! a goal, and a non-empty task list.
//!
//! Unrecognized top-level keys are ignored; structural defects beyond the
//! three load-time requirements (version, goal, tasks) are the static
//! validator's job, so a loaded program is not necessarily a valid one.

use crate::plan::program::Program;
use crate::protocol::codes::AST_VERSION;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading and decoding an AST document.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read program file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("program is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported ast_version '{found}' (expected '{}')", AST_VERSION)]
    UnsupportedAstVersion { found: String },

    #[error("program goal is required and must be non-empty")]
    MissingGoal,

    #[error("program must declare at least one task")]
    NoTasks,
}

/// Load a program from a file. Relative worker paths in the program resolve
/// against the file's parent directory.
pub fn load_program(path: &Path) -> Result<Program, LoadError> {
    let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    parse_program(&source, base_dir)
}

/// Decode a program from JSON source text.
pub fn parse_program(source: &str, base_dir: PathBuf) -> Result<Program, LoadError> {
    let mut program: Program = serde_json::from_str(source)?;
    program.base_dir = base_dir;

    if program.ast_version != AST_VERSION {
        return Err(LoadError::UnsupportedAstVersion {
            found: program.ast_version,
        });
    }
    if program.goal.trim().is_empty() {
        return Err(LoadError::MissingGoal);
    }
    if program.tasks.is_empty() {
        return Err(LoadError::NoTasks);
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_source() -> String {
        json!({
            "ast_version": "1.0",
            "goal": "ship release",
            "tasks": [
                {"name": "test_suite", "worker": "workers/test_suite.py"},
                {"name": "deploy_prod", "worker": "workers/deploy_prod.py",
                 "after": ["test_suite"]},
            ],
        })
        .to_string()
    }

    #[test]
    fn parses_minimal_program() {
        let program = parse_program(&minimal_source(), PathBuf::from("/plans")).unwrap();
        assert_eq!(program.goal, "ship release");
        assert_eq!(program.tasks.len(), 2);
        assert_eq!(program.tasks[1].after, vec!["test_suite".to_string()]);
        assert_eq!(program.base_dir, PathBuf::from("/plans"));
    }

    #[test]
    fn rejects_wrong_ast_version() {
        let source = json!({
            "ast_version": "2.0",
            "goal": "g",
            "tasks": [{"name": "a", "worker": "a.py"}],
        })
        .to_string();
        let err = parse_program(&source, PathBuf::new()).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedAstVersion { .. }));
    }

    #[test]
    fn rejects_missing_goal_and_empty_tasks() {
        let no_goal = json!({
            "ast_version": "1.0",
            "tasks": [{"name": "a", "worker": "a.py"}],
        })
        .to_string();
        assert!(matches!(
            parse_program(&no_goal, PathBuf::new()).unwrap_err(),
            LoadError::MissingGoal
        ));

        let no_tasks = json!({"ast_version": "1.0", "goal": "g", "tasks": []}).to_string();
        assert!(matches!(
            parse_program(&no_tasks, PathBuf::new()).unwrap_err(),
            LoadError::NoTasks
        ));
    }

    #[test]
    fn ignores_unrecognized_top_level_keys() {
        let source = json!({
            "ast_version": "1.0",
            "goal": "g",
            "tasks": [{"name": "a", "worker": "a.py"}],
            "x_extension": {"anything": true},
        })
        .to_string();
        assert!(parse_program(&source, PathBuf::new()).is_ok());
    }

    #[test]
    fn round_trips_through_wire_format() {
        let source = json!({
            "ast_version": "1.0",
            "goal": "ship release",
            "types": {
                "Report": [
                    {"path": "coverage", "type": "float", "optional": false, "line": 3},
                ],
            },
            "constraints": [
                {"key": "risk", "op": "<=", "value": 0.2, "line": 4},
            ],
            "tasks": [
                {"name": "test_suite", "worker": "workers/test_suite.py",
                 "produces": ["report"], "produces_types": {"report": "Report"},
                 "retries": 2, "backoff_seconds": 0.5, "timeout_seconds": 5.0},
                {"name": "deploy_prod", "worker": "workers/deploy_prod.py",
                 "after": ["test_suite"], "consumes": ["report"]},
            ],
            "verify": [
                {"line": 9, "expression": "deploy_prod.status == \"ok\""},
            ],
        })
        .to_string();

        let program = parse_program(&source, PathBuf::new()).unwrap();
        let wire = serde_json::to_string(&program).unwrap();
        let reparsed = parse_program(&wire, PathBuf::new()).unwrap();
        let rewire = serde_json::to_string(&reparsed).unwrap();
        assert_eq!(wire, rewire);
        assert_eq!(program.tasks, reparsed.tasks);
        assert_eq!(program.constraints, reparsed.constraints);
    }
}
