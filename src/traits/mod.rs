// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod clock;
pub mod dispatcher;

pub use clock::{Clock, SystemClock};
pub use dispatcher::Dispatcher;
