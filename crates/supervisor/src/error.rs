// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Top-level error taxonomy for the sync supervisor.
///
/// `Connection` is retried with exponential backoff by the supervisor's
/// retry loop; every other variant is fatal and propagates to the CLI as a
/// non-zero exit.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connection failure: {0}")]
    Connection(#[source] mongodb::error::Error),
    #[error("not authorized: {0}")]
    Authorization(#[source] mongodb::error::Error),
    #[error("change stream error: {0}")]
    ChangeStream(#[source] mongodb::error::Error),
    #[error(transparent)]
    Stream(#[from] docsync_stream::StreamError),
    #[error(transparent)]
    Apply(#[from] docsync_apply::ApplyError),
    #[error(transparent)]
    State(#[from] docsync_storage::StateStoreError),
    #[error("driver error: {0}")]
    Driver(#[from] mongodb::error::Error),
    #[error("max retries ({0}) exceeded")]
    MaxRetriesExceeded(u32),
}

/// Classify a driver-level operation failure the way spec.md §7 describes:
/// connection failures are retriable, authorization and change-stream
/// failures are surfaced (not retried at this layer), everything else is a
/// generic fatal error. String-matching the error message is crude but
/// mirrors the upstream driver's own lack of a dedicated "unauthorized"
/// error variant across server versions.
pub fn classify_connection_error(err: &mongodb::error::Error) -> SyncErrorClass {
    use mongodb::error::ErrorKind;

    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. } => SyncErrorClass::Connection,
        ErrorKind::Io(_) => SyncErrorClass::Connection,
        _ => {
            let message = err.to_string().to_lowercase();
            if message.contains("not authorized") || message.contains("unauthorized") {
                SyncErrorClass::Authorization
            } else if message.contains("change stream") {
                SyncErrorClass::ChangeStream
            } else if message.contains("connection") {
                SyncErrorClass::Connection
            } else {
                SyncErrorClass::Generic
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorClass {
    Connection,
    Authorization,
    ChangeStream,
    Generic,
}
