// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shared data model for the DocumentDB change-stream sync engine.
//!
//! This crate has no I/O: it defines the types that flow between the
//! stream multiplexer, the applier, and the state store, plus the
//! configuration shape and connection-identity helpers.

mod config;
mod event;
mod identity;
mod stats;
mod state_file;
mod watch_target;

pub use config::{Config, ConfigError, RawConfig};
pub use event::{extract_document_id, ChangeEvent, EventKind, Namespace, ResumeToken};
pub use identity::{cluster_label, state_file_path};
pub use stats::{OperationKind, SyncStats};
pub use state_file::SyncStateFile;
pub use watch_target::{WatchTarget, WatchTargetParseError};
