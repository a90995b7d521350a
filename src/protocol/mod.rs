// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod codes;
mod result;

pub use result::{merge_error, AttemptRecord, TaskResult, TaskStatus};
