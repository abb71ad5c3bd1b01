// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Round-robin multiplexing of per-collection MongoDB/DocumentDB change
//! streams into a single sequence of tagged events.

mod conversion;
mod multiplex;

pub use conversion::convert_event;
pub use multiplex::{open_streams, Multiplexer, StreamError, WatchStream};
