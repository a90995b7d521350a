// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod executor;
#[cfg(test)]
pub mod integration_tests;
pub mod retry;

pub use executor::{Engine, EngineOptions, ExecutionError};
