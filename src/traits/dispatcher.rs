// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::plan::program::Task;
use crate::protocol::TaskResult;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// The seam between the retry controller and whatever actually runs a
/// worker.
///
/// One call is one attempt. Implementations classify every failure mode
/// (timeout, bad output, spawn error) into the returned [`TaskResult`];
/// dispatching never raises. `attempt`/`max_attempts` are provenance only;
/// retry policy lives with the caller.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        task: &Task,
        base_dir: &Path,
        payload: &Value,
        attempt: u32,
        max_attempts: u32,
    ) -> TaskResult;
}
