// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Worker command resolution.
//!
//! The file suffix of the resolved worker path picks the interpreter:
//! `.py` runs under Python, `.js`/`.mjs`/`.cjs` under `node`, `.ts` under
//! `tsx`. Interpreters are looked up on `PATH` at dispatch time; anything
//! else is an unsupported worker type.

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("python3 is required for Python workers")]
    PythonMissing,

    #[error("node is required for JavaScript workers")]
    NodeMissing,

    #[error("tsx is required for TypeScript workers")]
    TsxMissing,

    #[error("unsupported worker type '{suffix}' for task worker '{worker}'")]
    UnsupportedSuffix { suffix: String, worker: String },
}

/// Resolve a worker string against the program's base directory. Absolute
/// paths are used verbatim.
pub fn resolve_worker_path(worker: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(worker);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Resolve the argv for one worker invocation.
pub fn resolve_worker_command(worker: &str, base_dir: &Path) -> Result<Vec<String>, CommandError> {
    let path = resolve_worker_path(worker, base_dir);
    let suffix = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let path_text = path.to_string_lossy().into_owned();
    match suffix.as_str() {
        ".py" => {
            let interpreter = find_on_path("python3")
                .or_else(|| find_on_path("python"))
                .ok_or(CommandError::PythonMissing)?;
            Ok(vec![interpreter.to_string_lossy().into_owned(), path_text])
        }
        ".js" | ".mjs" | ".cjs" => {
            let node = find_on_path("node").ok_or(CommandError::NodeMissing)?;
            Ok(vec![node.to_string_lossy().into_owned(), path_text])
        }
        ".ts" => {
            let tsx = find_on_path("tsx").ok_or(CommandError::TsxMissing)?;
            Ok(vec![tsx.to_string_lossy().into_owned(), path_text])
        }
        _ => Err(CommandError::UnsupportedSuffix {
            suffix,
            worker: worker.to_string(),
        }),
    }
}

/// Join an argv into the shell-safe command string recorded in provenance.
pub fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|part| shell_quote(part))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(part: &str) -> String {
    let safe = !part.is_empty()
        && part.chars().all(|ch| {
            ch.is_ascii_alphanumeric() || matches!(ch, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
        });
    if safe {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

fn find_on_path(binary: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_workers_resolve_verbatim() {
        let resolved = resolve_worker_path("/opt/workers/lint.py", Path::new("/plans"));
        assert_eq!(resolved, PathBuf::from("/opt/workers/lint.py"));
    }

    #[test]
    fn relative_workers_resolve_against_base_dir() {
        let resolved = resolve_worker_path("workers/lint.py", Path::new("/plans"));
        assert_eq!(resolved, PathBuf::from("/plans/workers/lint.py"));
    }

    #[test]
    fn unsupported_suffix_is_an_error() {
        let err = resolve_worker_command("workers/lint.sh", Path::new("/plans")).unwrap_err();
        assert_eq!(
            err,
            CommandError::UnsupportedSuffix {
                suffix: ".sh".to_string(),
                worker: "workers/lint.sh".to_string(),
            }
        );
        assert!(resolve_worker_command("workers/noext", Path::new("/plans")).is_err());
    }

    #[test]
    fn python_workers_resolve_to_an_interpreter() {
        // Only meaningful where a Python interpreter is installed, which is
        // also what the worker protocol's own tests rely on.
        if let Ok(command) = resolve_worker_command("workers/lint.py", Path::new("/plans")) {
            assert_eq!(command.len(), 2);
            assert!(command[0].contains("python"));
            assert_eq!(command[1], "/plans/workers/lint.py");
        }
    }

    #[test]
    fn shell_join_quotes_only_when_needed() {
        let parts = vec![
            "/usr/bin/python3".to_string(),
            "/plans/workers/lint.py".to_string(),
        ];
        assert_eq!(shell_join(&parts), "/usr/bin/python3 /plans/workers/lint.py");

        let tricky = vec!["a b".to_string(), "it's".to_string(), String::new()];
        assert_eq!(shell_join(&tricky), r#"'a b' 'it'\''s' ''"#);
    }
}
