// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Message types follow a struct-based pattern with `Display` plus the
//! [`messages::StructuredLog`] trait, so operational events carry queryable
//! fields instead of preformatted strings scattered through the engine.

pub mod messages;
