// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod command;
pub mod process;
pub mod stub;

pub use command::{resolve_worker_command, resolve_worker_path, shell_join, CommandError};
pub use process::ProcessDispatcher;
