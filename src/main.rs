// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The `gantry` command line: validate, plan, graph, and run mission plans.
//!
//! Exit codes follow the trace: `run` exits 0 only when the trace status is
//! `ok`; `validate` and `plan` exit 0 only on a valid program. Diagnostics
//! go to stderr, documents to stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gantry::engine::{Engine, EngineOptions, ExecutionError};
use gantry::plan::{
    build_execution_levels, build_execution_order, build_mermaid_graph, load_program,
    validate_program, Program,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gantry",
    about = "Execute declarative mission plans against external workers"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a plan without executing it
    Validate {
        /// Path to the plan's AST JSON document
        program: PathBuf,
        /// Capability names granted for validation (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        /// Emit machine-readable validation output
        #[arg(long)]
        json: bool,
    },
    /// Show execution levels and the flattened task order
    Plan {
        program: PathBuf,
        #[arg(long = "capability")]
        capabilities: Vec<String>,
    },
    /// Render the plan graph as a Mermaid document
    Graph { program: PathBuf },
    /// Execute a plan and print its trace
    Run {
        program: PathBuf,
        /// Capability names granted to this run (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        /// Runtime variable as key=value (example: --var risk=0.2)
        #[arg(long = "var")]
        variables: Vec<String>,
        /// Optional path to also write the JSON trace to
        #[arg(long = "trace-out")]
        trace_out: Option<PathBuf>,
        /// Run tasks one at a time even when levels allow parallelism
        #[arg(long)]
        sequential: bool,
        /// Maximum workers to run concurrently per dependency level
        #[arg(long = "max-parallel", default_value_t = 4)]
        max_parallel: usize,
        /// Seed for deterministic retry jitter
        #[arg(long = "retry-seed")]
        retry_seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Validate {
            program,
            capabilities,
            json,
        } => {
            let loaded = load_program(&program)?;
            let errors = validate_program(&loaded, Some(&capability_set(&capabilities)));
            if json {
                let document = json!({
                    "program": canonical_display(&program),
                    "valid": errors.is_empty(),
                    "errors": errors,
                });
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else if errors.is_empty() {
                println!("valid");
            } else {
                for error in &errors {
                    eprintln!("{error}");
                }
            }
            Ok(if errors.is_empty() { 0 } else { 1 })
        }

        Command::Plan {
            program,
            capabilities,
        } => {
            let loaded = load_program(&program)?;
            if let Some(code) =
                report_errors(&validate_program(&loaded, Some(&capability_set(&capabilities))))
            {
                return Ok(code);
            }
            let levels = build_execution_levels(&loaded.tasks)?;
            let order = build_execution_order(&loaded.tasks)?;
            let document = json!({"task_order": order, "levels": levels});
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(0)
        }

        Command::Graph { program } => {
            let loaded = load_program(&program)?;
            if let Some(code) = report_errors(&validate_program(&loaded, None)) {
                return Ok(code);
            }
            println!("{}", build_mermaid_graph(&loaded.tasks)?);
            Ok(0)
        }

        Command::Run {
            program,
            capabilities,
            variables,
            trace_out,
            sequential,
            max_parallel,
            retry_seed,
        } => {
            let loaded: Program = load_program(&program)?;
            let options = EngineOptions {
                capabilities: capability_set(&capabilities),
                variables: parse_variables(&variables)?,
                parallel: !sequential,
                max_parallel,
                retry_seed,
            };

            let trace = match Engine::new(options).execute(&loaded).await {
                Ok(trace) => trace,
                Err(ExecutionError::Rejected { errors }) => {
                    for error in &errors {
                        eprintln!("{error}");
                    }
                    return Ok(1);
                }
                Err(error) => {
                    eprintln!("{error}");
                    return Ok(1);
                }
            };

            let rendered = serde_json::to_string_pretty(&trace)?;
            println!("{rendered}");
            if let Some(path) = trace_out {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("cannot create {}", parent.display()))?;
                }
                std::fs::write(&path, &rendered)
                    .with_context(|| format!("cannot write trace to {}", path.display()))?;
            }
            Ok(match trace.status {
                gantry::trace::RunStatus::Ok => 0,
                gantry::trace::RunStatus::Failed => 1,
            })
        }
    }
}

fn report_errors(errors: &[String]) -> Option<i32> {
    if errors.is_empty() {
        return None;
    }
    for error in errors {
        eprintln!("{error}");
    }
    Some(1)
}

fn capability_set(capabilities: &[String]) -> BTreeSet<String> {
    capabilities.iter().cloned().collect()
}

fn canonical_display(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Parse `--var key=value` pairs into the engine's variable map.
fn parse_variables(raw: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut variables = Map::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            anyhow::bail!("invalid --var format: {item}, expected key=value");
        };
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("invalid --var key in '{item}'");
        }
        variables.insert(key.to_string(), parse_literal(value.trim()));
    }
    Ok(variables)
}

/// Interpret a variable value the way plan literals read: booleans and null
/// (case-insensitive), integers, decimal floats, double-quoted strings, and
/// bare strings for everything else.
fn parse_literal(raw: &str) -> Value {
    let lowered = raw.to_ascii_lowercase();
    match lowered.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }

    if is_integer_literal(raw) {
        if let Ok(value) = raw.parse::<i64>() {
            return Value::from(value);
        }
    }
    if is_float_literal(raw) {
        if let Ok(value) = raw.parse::<f64>() {
            return Value::from(value);
        }
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        if let Ok(text) = serde_json::from_str::<String>(raw) {
            return Value::from(text);
        }
    }
    Value::from(raw)
}

fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_float_literal(raw: &str) -> bool {
    let body = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    let Some((whole, fraction)) = body.split_once('.') else {
        return false;
    };
    !whole.is_empty()
        && !fraction.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}
