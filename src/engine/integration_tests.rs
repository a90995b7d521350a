// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! End-to-end engine tests against real worker subprocesses.
//!
//! These exercise the full path: payload on stdin, JSON classification,
//! deadlines, retries, and trace assembly. They need a Python interpreter on
//! PATH and skip themselves quietly where none exists.

#[cfg(test)]
mod tests {
    use crate::engine::{Engine, EngineOptions};
    use crate::plan::program::Program;
    use crate::protocol::codes;
    use crate::trace::{ExecutionMode, RunStatus};
    use std::io::Write;
    use std::time::Instant;

    fn python_missing() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_err()
    }

    struct Workspace {
        dir: tempfile::TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn write_worker(&self, name: &str, body: &str) {
            let path = self.dir.path().join(name);
            let mut file = std::fs::File::create(path).unwrap();
            writeln!(file, "#!/usr/bin/env python3").unwrap();
            writeln!(file, "{body}").unwrap();
        }

        fn program(&self, value: serde_json::Value) -> Program {
            let mut program: Program = serde_json::from_value(value).unwrap();
            program.base_dir = self.dir.path().to_path_buf();
            program
        }
    }

    fn sequential() -> EngineOptions {
        EngineOptions {
            parallel: false,
            ..EngineOptions::default()
        }
    }

    #[tokio::test]
    async fn linear_release_pipeline_produces_an_ok_trace() {
        if python_missing() {
            return;
        }
        let workspace = Workspace::new();
        workspace.write_worker(
            "test_suite.py",
            "import json, sys\n\
             sys.stdin.read()\n\
             print(json.dumps({\"status\": \"ok\", \"confidence\": 0.93,\n\
                 \"output\": {\"coverage\": 0.94, \"tests_passed\": 128}}))\n",
        );
        workspace.write_worker(
            "deploy_prod.py",
            "import json, sys\n\
             payload = json.loads(sys.stdin.read() or \"{}\")\n\
             tests = payload[\"dependencies\"][\"test_suite\"]\n\
             ok = tests[\"status\"] == \"ok\"\n\
             out = {\"status\": \"ok\" if ok else \"error\",\n\
                    \"output\": {\"release\": \"2026.02.0\", \"risk\": 0.06}}\n\
             print(json.dumps(out))\n",
        );

        let program = workspace.program(serde_json::json!({
            "goal": "ship release",
            "constraints": [{"key": "risk", "op": "<=", "value": 0.2, "line": 4}],
            "tasks": [
                {"name": "test_suite", "worker": "test_suite.py"},
                {"name": "deploy_prod", "worker": "deploy_prod.py", "after": ["test_suite"]},
            ],
            "verify": [
                {"line": 9, "expression": "deploy_prod.status == \"ok\""},
                {"line": 10, "expression": "test_suite.output.coverage >= 0.9"},
            ],
        }));

        let trace = Engine::new(sequential()).execute(&program).await.unwrap();

        assert_eq!(trace.status, RunStatus::Ok);
        assert_eq!(trace.task_order, vec!["test_suite", "deploy_prod"]);
        assert_eq!(trace.execution.mode, ExecutionMode::Sequential);
        assert_eq!(trace.tasks[0].confidence, 0.93);
        assert_eq!(trace.constraints[0].passed, Some(true));
        assert_eq!(trace.verify_summary.failed, 0);
        // Provenance carries the dispatcher's fields.
        assert!(trace.tasks[0].provenance.contains_key("stdout_sha256"));
        assert!(trace.tasks[0].provenance["command"]
            .as_str()
            .unwrap()
            .contains("test_suite.py"));
    }

    #[tokio::test]
    async fn fan_out_levels_overlap_in_wall_time() {
        if python_missing() {
            return;
        }
        let workspace = Workspace::new();
        for name in ["a.py", "b.py", "c.py"] {
            workspace.write_worker(
                name,
                "import json, sys, time\n\
                 sys.stdin.read()\n\
                 time.sleep(0.4)\n\
                 print(json.dumps({\"status\": \"ok\", \"output\": {}}))\n",
            );
        }
        let program = workspace.program(serde_json::json!({
            "goal": "fan out",
            "tasks": [
                {"name": "a", "worker": "a.py"},
                {"name": "b", "worker": "b.py"},
                {"name": "c", "worker": "c.py"},
            ],
        }));

        let options = EngineOptions {
            parallel: true,
            max_parallel: 3,
            ..EngineOptions::default()
        };
        let started = Instant::now();
        let trace = Engine::new(options).execute(&program).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(trace.status, RunStatus::Ok);
        assert_eq!(trace.execution.mode, ExecutionMode::Parallel);
        assert_eq!(trace.execution.levels, vec![vec!["a", "b", "c"]]);
        // Three 0.4s workers in sequence would need 1.2s; overlap means the
        // level finishes well under that.
        assert!(
            elapsed.as_secs_f64() < 1.0,
            "expected overlapping workers, took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn deadline_kills_the_worker_and_retry_reattempts_it() {
        if python_missing() {
            return;
        }
        let workspace = Workspace::new();
        workspace.write_worker(
            "slow.py",
            "import sys, time\n\
             sys.stdin.read()\n\
             time.sleep(5)\n\
             print('{\"status\": \"ok\"}')\n",
        );
        let program = workspace.program(serde_json::json!({
            "goal": "g",
            "tasks": [{
                "name": "slow", "worker": "slow.py",
                "timeout_seconds": 0.2, "retries": 1, "retry_if": "timeout",
            }],
        }));

        let trace = Engine::new(sequential()).execute(&program).await.unwrap();

        assert_eq!(trace.status, RunStatus::Failed);
        let result = &trace.tasks[0];
        assert_eq!(result.error_code.as_deref(), Some(codes::WORKER_TIMEOUT));
        assert!(result.error.as_deref().unwrap().contains("timed out"));
        let attempts = result.provenance["attempts"].as_array().unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(
            attempts[0]["error_code"],
            serde_json::json!(codes::WORKER_TIMEOUT)
        );
    }

    #[tokio::test]
    async fn malformed_worker_output_is_classified_not_crashed() {
        if python_missing() {
            return;
        }
        let workspace = Workspace::new();
        workspace.write_worker(
            "garbled.py",
            "import sys\nsys.stdin.read()\nprint('this is not json')\n",
        );
        let program = workspace.program(serde_json::json!({
            "goal": "g",
            "tasks": [{"name": "garbled", "worker": "garbled.py"}],
        }));

        let trace = Engine::new(sequential()).execute(&program).await.unwrap();

        assert_eq!(trace.status, RunStatus::Failed);
        assert_eq!(
            trace.tasks[0].error_code.as_deref(),
            Some(codes::WORKER_OUTPUT_JSON_INVALID)
        );
        assert_eq!(trace.tasks[0].confidence, 0.0);
    }

    #[tokio::test]
    async fn silent_success_and_stderr_capture() {
        if python_missing() {
            return;
        }
        let workspace = Workspace::new();
        workspace.write_worker(
            "quiet.py",
            "import sys\nsys.stdin.read()\nprint('working...', file=sys.stderr)\n",
        );
        let program = workspace.program(serde_json::json!({
            "goal": "g",
            "tasks": [{"name": "quiet", "worker": "quiet.py"}],
        }));

        let trace = Engine::new(sequential()).execute(&program).await.unwrap();

        assert_eq!(trace.status, RunStatus::Ok);
        let result = &trace.tasks[0];
        assert_eq!(result.confidence, 0.5);
        assert!(result.output.is_empty());
        assert_eq!(result.stderr.as_deref(), Some("working..."));
    }

    #[tokio::test]
    async fn ok_claim_with_nonzero_exit_is_overridden() {
        if python_missing() {
            return;
        }
        let workspace = Workspace::new();
        workspace.write_worker(
            "liar.py",
            "import sys\n\
             sys.stdin.read()\n\
             print('{\"status\": \"ok\", \"output\": {\"x\": 1}}')\n\
             sys.exit(3)\n",
        );
        let program = workspace.program(serde_json::json!({
            "goal": "g",
            "tasks": [{"name": "liar", "worker": "liar.py"}],
        }));

        let trace = Engine::new(sequential()).execute(&program).await.unwrap();

        assert_eq!(trace.status, RunStatus::Failed);
        let result = &trace.tasks[0];
        assert_eq!(
            result.error_code.as_deref(),
            Some(codes::WORKER_EXIT_NONZERO)
        );
        assert_eq!(result.provenance["return_code"], serde_json::json!(3));
        // The worker's declared output is preserved alongside the override.
        assert_eq!(result.output["x"], serde_json::json!(1));
    }
}
