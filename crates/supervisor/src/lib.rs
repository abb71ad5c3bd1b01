// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Top-level orchestration: connect, initialize state, stream, apply,
//! persist, with graceful shutdown and connection-failure retry.
//!
//! Structured the way `ojd`'s main loop is structured — a polled shutdown
//! flag checked once per iteration, and a tail block that unconditionally
//! flushes durable state before the process exits — generalized from a
//! `tokio::select!`-driven engine loop to this engine's simpler
//! poll-and-sleep shape (spec.md §5 calls for single-threaded cooperative
//! scheduling, not a multi-task daemon).

mod error;
mod retry;
mod shutdown;

pub use error::{classify_connection_error, SyncError, SyncErrorClass};
pub use retry::{backoff_delay, MAX_RETRIES};
pub use shutdown::ShutdownFlag;

use std::time::{Duration, Instant};

use docsync_apply::{apply_change, ApplyOutcome, MongoTarget};
use docsync_core::{state_file_path, Config, OperationKind, WatchTarget};
use docsync_storage::StateStore;
use docsync_stream::open_streams;
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::{error, info, warn};

const SOURCE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TARGET_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Resolve the on-disk state file path for a config, rooted at `base_dir`
/// (the running executable's directory, per spec.md §4.5/§6).
pub fn resolve_state_path(base_dir: &std::path::Path, config: &Config) -> std::path::PathBuf {
    state_file_path(base_dir, &config.source_uri, &config.target_uri)
}

/// Drive the sync engine to completion: retry loop around `run_sync`,
/// honoring `shutdown` for graceful exit.
///
/// Returns `Ok(())` on clean shutdown, `Err(SyncError::MaxRetriesExceeded)`
/// once connection-failure retries are exhausted, or any other `SyncError`
/// for a fatal (non-retriable) condition.
pub async fn run_supervisor(
    config: &Config,
    state_path: std::path::PathBuf,
    reset: bool,
    shutdown: ShutdownFlag,
) -> Result<(), SyncError> {
    let mut state = StateStore::load(state_path, config.persist_interval)?;
    if reset {
        state.reset()?;
    }

    let mut attempt = 0u32;
    loop {
        if shutdown.is_set() {
            info!("shutdown requested before connecting, exiting cleanly");
            return Ok(());
        }

        match run_sync(config, &mut state, &shutdown).await {
            Ok(SyncOutcome::Shutdown) => return Ok(()),
            Ok(SyncOutcome::Reopen) => {
                info!("reopening change streams from last persisted tokens");
                continue;
            }
            Err(SyncError::Connection(e)) => {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    error!(attempts = attempt, "max retries exceeded");
                    return Err(SyncError::MaxRetriesExceeded(MAX_RETRIES));
                }
                let delay = backoff_delay(attempt);
                warn!(
                    attempt,
                    max_retries = MAX_RETRIES,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "connection error, retrying after backoff"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wait_for_shutdown(&shutdown) => {
                        info!("shutdown requested during backoff, exiting cleanly");
                        return Ok(());
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
}

async fn wait_for_shutdown(flag: &ShutdownFlag) {
    loop {
        if flag.is_set() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Why a single `run_sync` attempt returned without an error.
enum SyncOutcome {
    /// The shutdown flag was observed; the supervisor should exit cleanly.
    Shutdown,
    /// The change stream was invalidated; the supervisor's retry loop should
    /// immediately reopen it (no backoff, no retry-count increment) using
    /// the last persisted resume tokens.
    Reopen,
}

/// One connect-init-stream-apply-persist attempt. Returns `Ok(SyncOutcome::Shutdown)`
/// on a clean, intentional exit (shutdown flag observed) or
/// `Ok(SyncOutcome::Reopen)` when the stream was invalidated and the caller's
/// retry loop should reopen it; connection failures surface as
/// `SyncError::Connection` for the retry loop above.
async fn run_sync(
    config: &Config,
    state: &mut StateStore,
    shutdown: &ShutdownFlag,
) -> Result<SyncOutcome, SyncError> {
    let source = connect(&config.source_uri, SOURCE_CONNECT_TIMEOUT)
        .await
        .map_err(classify_into_sync_error)?;
    let target = connect(&config.target_uri, TARGET_CONNECT_TIMEOUT)
        .await
        .map_err(classify_into_sync_error)?;

    let collection_keys: Vec<String> = config.watch_targets.iter().map(WatchTarget::key).collect();
    state.init_collections(&collection_keys)?;

    let resume_tokens: std::collections::HashMap<_, _> = collection_keys
        .iter()
        .map(|key| (key.clone(), state.get_resume_token(key)))
        .collect();

    let mut multiplexer = open_streams(&source, &config.watch_targets, &resume_tokens)
        .await
        .map_err(SyncError::from)?;

    let target_writer = MongoTarget::new(target.clone());
    let mut local_events: u64 = 0;
    let mut last_status = Instant::now();

    let outcome = loop {
        if shutdown.is_set() {
            info!("shutdown requested, exiting main loop");
            break Ok(SyncOutcome::Shutdown);
        }

        let (watched, event) = multiplexer.try_next().await;
        let (Some(target_key), Some(event)) = (watched, event) else {
            state.flush_if_pending()?;
            continue;
        };

        info!(collection = %target_key, operation = event.kind.operation_type(), "change event");

        match apply_change(&target_writer, &event).await {
            Ok(ApplyOutcome::Applied(kind)) => {
                state.record_operation(kind);
                state.update_resume_token(&target_key.key(), event.id.clone())?;
                local_events += 1;
            }
            Ok(ApplyOutcome::Skipped) => {
                state.update_resume_token(&target_key.key(), event.id.clone())?;
            }
            Ok(ApplyOutcome::Invalidated) => {
                warn!(collection = %target_key, "stream invalidated, reopening");
                break Ok(SyncOutcome::Reopen);
            }
            Err(e) => {
                warn!(collection = %target_key, error = %e, "apply failure, recording error and continuing");
                state.record_operation(OperationKind::Error);
                state.update_resume_token(&target_key.key(), event.id.clone())?;
            }
        }

        if last_status.elapsed() >= STATUS_LOG_INTERVAL {
            let stats = state.get_stats();
            info!(
                synced_this_run = local_events,
                total_synced = stats.total_synced,
                inserts = stats.inserts,
                updates = stats.updates,
                deletes = stats.deletes,
                errors = stats.errors,
                "sync status"
            );
            last_status = Instant::now();
        }
    };

    multiplexer.close().await;
    info!("persisting final state");
    if let Err(e) = state.persist() {
        error!(error = %e, "failed to persist final state");
        return Err(e.into());
    }
    info!(stats = ?state.get_stats(), "final stats");

    outcome
}

async fn connect(uri: &str, timeout: Duration) -> Result<Client, mongodb::error::Error> {
    let mut options = ClientOptions::parse(uri).await?;
    options.connect_timeout = Some(timeout);
    options.server_selection_timeout = Some(timeout);
    let client = Client::with_options(options)?;
    client
        .database("admin")
        .run_command(bson::doc! { "ping": 1 })
        .await?;
    Ok(client)
}

fn classify_into_sync_error(err: mongodb::error::Error) -> SyncError {
    match classify_connection_error(&err) {
        SyncErrorClass::Connection => SyncError::Connection(err),
        SyncErrorClass::Authorization => SyncError::Authorization(err),
        SyncErrorClass::ChangeStream => SyncError::ChangeStream(err),
        SyncErrorClass::Generic => SyncError::Driver(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_state_path_is_deterministic_for_same_config() {
        let config = Config {
            source_uri: "mongodb://localhost/db".to_string(),
            target_uri: "mongodb://localhost:27018/db".to_string(),
            watch_targets: vec![WatchTarget::new("a", "b")],
            persist_interval: 10,
            logging_level: "INFO".to_string(),
        };
        let base = std::path::Path::new("/opt/docsync");
        let first = resolve_state_path(base, &config);
        let second = resolve_state_path(base, &config);
        assert_eq!(first, second);
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".documentdb_sync_state_"));
    }
}
