// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] for machine-readable fields and span creation, keeping
//! magic strings out of the engine itself.
//!
//! Messages are organized by subsystem:
//! * `engine` - run lifecycle and level dispatch events
//! * `validation` - program rejection

pub mod engine;
pub mod validation;

use tracing::Span;

/// Messages that can emit themselves as structured log events and open
/// spans carrying their fields as attributes.
pub trait StructuredLog {
    /// Emit a log event with structured fields. The level is chosen by the
    /// message type's semantics.
    fn log(&self);

    /// Create a span with this message's fields as attributes.
    fn span(&self, name: &str) -> Span;
}
