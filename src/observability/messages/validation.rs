// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for program validation outcomes.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A program failed static validation and will not execute.
///
/// # Log Level
/// `error!` - The caller's input must change before a run is possible
pub struct ProgramRejected {
    pub error_count: usize,
}

impl Display for ProgramRejected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Program rejected by static validation with {} error(s)",
            self.error_count
        )
    }
}

impl StructuredLog for ProgramRejected {
    fn log(&self) {
        tracing::error!(error_count = self.error_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "program_rejected",
            span_name = name,
            error_count = self.error_count,
        )
    }
}
