// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use chrono::Utc;
use docsync_core::{OperationKind, ResumeToken, SyncStateFile, SyncStats};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::writer::{write_atomic, FsStateWriter, StateWriteError, StateWriter};

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error(transparent)]
    Write(#[from] StateWriteError),
    #[error("failed to serialize state file: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Crash-safe persistence of resume tokens, timestamps, and sync counters.
///
/// Mirrors the atomic write protocol of the teacher checkpointer — write to
/// a temp file in the same directory, fsync, rename, fsync the directory —
/// but runs it synchronously and without compression, since the state file
/// here holds a handful of resume tokens rather than a full snapshot.
pub struct StateStore<W: StateWriter = FsStateWriter> {
    writer: W,
    path: PathBuf,
    state: SyncStateFile,
    changes_since_persist: u32,
    persist_interval: u32,
}

impl StateStore<FsStateWriter> {
    /// Load (or start fresh) the state file at `path` using real filesystem I/O.
    pub fn load(path: PathBuf, persist_interval: u32) -> Result<Self, StateStoreError> {
        Self::load_with_writer(FsStateWriter, path, persist_interval)
    }
}

impl<W: StateWriter> StateStore<W> {
    /// Load (or start fresh) the state file at `path` through a given writer.
    pub fn load_with_writer(
        writer: W,
        path: PathBuf,
        persist_interval: u32,
    ) -> Result<Self, StateStoreError> {
        let state = match writer.read(&path)? {
            Some(bytes) => match serde_json::from_slice::<SyncStateFile>(&bytes) {
                Ok(state) => {
                    info!(path = %path.display(), "loaded sync state");
                    log_resume_preview(&state);
                    state
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupted state file, starting fresh");
                    SyncStateFile::default()
                }
            },
            None => {
                info!(path = %path.display(), "no existing state file, starting fresh sync");
                SyncStateFile::default()
            }
        };

        Ok(Self {
            writer,
            path,
            state,
            changes_since_persist: 0,
            persist_interval,
        })
    }

    /// Ensure every watched collection has a `resume_tokens` entry (`None` if
    /// absent), then persist immediately so the state file exists before any
    /// changes are consumed.
    pub fn init_collections(&mut self, collections: &[String]) -> Result<(), StateStoreError> {
        for coll in collections {
            if !self.state.resume_tokens.contains_key(coll) {
                self.state.resume_tokens.insert(coll.clone(), None);
                info!(collection = %coll, "initialized resume token (fresh start)");
            } else {
                match self.state.resume_tokens.get(coll).and_then(|t| t.clone()) {
                    Some(token) => {
                        info!(collection = %coll, token = %token_preview(&token), "existing resume token");
                    }
                    None => {
                        info!(collection = %coll, "no resume token (fresh start)");
                    }
                }
            }
        }
        self.persist()?;
        info!(count = collections.len(), "state file initialized");
        Ok(())
    }

    pub fn get_resume_token(&self, collection: &str) -> Option<ResumeToken> {
        self.state.resume_tokens.get(collection).cloned().flatten()
    }

    /// Record `token` as the new resume position for `collection`, update the
    /// last-sync timestamp, and persist every `persist_interval` calls.
    pub fn update_resume_token(
        &mut self,
        collection: &str,
        token: ResumeToken,
    ) -> Result<(), StateStoreError> {
        self.state
            .resume_tokens
            .insert(collection.to_string(), Some(token));
        self.state.last_sync_time = Some(format!("{}Z", Utc::now().format("%Y-%m-%dT%H:%M:%S%.f")));
        self.changes_since_persist += 1;

        if self.changes_since_persist >= self.persist_interval {
            self.persist()?;
            self.changes_since_persist = 0;
        }
        Ok(())
    }

    pub fn record_operation(&mut self, kind: OperationKind) {
        self.state.sync_stats.record(kind);
    }

    /// Force an immediate write of the current state to disk.
    pub fn persist(&mut self) -> Result<(), StateStoreError> {
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        write_atomic(&self.writer, &self.path, &bytes)?;
        self.changes_since_persist = 0;
        debug!(path = %self.path.display(), "state persisted to disk");
        Ok(())
    }

    /// Persist only if changes have accumulated since the last persist —
    /// called when the stream goes idle so tokens are not held back merely
    /// because `persist_interval` has not been reached.
    pub fn flush_if_pending(&mut self) -> Result<(), StateStoreError> {
        if self.changes_since_persist > 0 {
            info!(
                pending = self.changes_since_persist,
                "persisting resume tokens for pending change(s)"
            );
            self.persist()?;
        }
        Ok(())
    }

    pub fn get_stats(&self) -> SyncStats {
        self.state.sync_stats
    }

    /// Reset in-memory state to defaults and delete the state file if present.
    pub fn reset(&mut self) -> Result<(), StateStoreError> {
        self.state = SyncStateFile::default();
        self.changes_since_persist = 0;
        self.writer.remove(&self.path)?;
        info!(path = %self.path.display(), "state reset");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn log_resume_preview(state: &SyncStateFile) {
    for (coll, token) in &state.resume_tokens {
        match token {
            Some(token) => {
                info!(collection = %coll, token = %token_preview(token), "will resume from token");
            }
            None => {
                info!(collection = %coll, "no stored token, fresh start");
            }
        }
    }
    let stats = &state.sync_stats;
    info!(
        total = stats.total_synced,
        inserts = stats.inserts,
        updates = stats.updates,
        deletes = stats.deletes,
        "previous sync stats"
    );
}

fn token_preview(token: &ResumeToken) -> String {
    let text = match token.0.get("_data") {
        Some(bson::Bson::String(s)) => s.clone(),
        _ => token.0.to_string(),
    };
    text.chars().take(20).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::fakes::FakeStateWriter;
    use bson::doc;

    fn store_with_fake(persist_interval: u32) -> (StateStore<FakeStateWriter>, PathBuf) {
        let path = PathBuf::from("/state/sync.json");
        let store =
            StateStore::load_with_writer(FakeStateWriter::new(), path.clone(), persist_interval)
                .unwrap();
        (store, path)
    }

    #[test]
    fn fresh_start_has_no_tokens() {
        let (store, _) = store_with_fake(10);
        assert_eq!(store.get_resume_token("cstest.items"), None);
        assert_eq!(store.get_stats(), SyncStats::default());
    }

    #[test]
    fn init_collections_persists_null_entries_immediately() {
        let (mut store, path) = store_with_fake(10);
        store
            .init_collections(&["cstest.items".to_string(), "cstest.orders".to_string()])
            .unwrap();

        let raw = store.writer.read(&path).unwrap().unwrap();
        let parsed: SyncStateFile = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed.resume_tokens.get("cstest.items"), Some(&None));
        assert_eq!(parsed.resume_tokens.get("cstest.orders"), Some(&None));
    }

    #[test]
    fn init_collections_preserves_existing_tokens() {
        let (mut store, _) = store_with_fake(10);
        store.init_collections(&["cstest.items".to_string()]).unwrap();
        let token = ResumeToken::from_document(doc! { "_data": "ABC123" });
        store
            .update_resume_token("cstest.items", token.clone())
            .unwrap();

        // simulate a restart: reload from the same backing writer
        let reloaded =
            StateStore::load_with_writer(store.writer.clone(), store.path.clone(), 10).unwrap();
        assert_eq!(reloaded.get_resume_token("cstest.items"), Some(token));
    }

    #[test]
    fn update_resume_token_persists_at_interval() {
        let (mut store, path) = store_with_fake(3);
        let token = ResumeToken::from_document(doc! { "_data": "T" });

        store.update_resume_token("a.b", token.clone()).unwrap();
        store.update_resume_token("a.b", token.clone()).unwrap();
        // Not yet at the interval: nothing durable beyond init's persist should differ.
        let before = store.writer.read(&path).unwrap();

        store.update_resume_token("a.b", token).unwrap();
        let after = store.writer.read(&path).unwrap();
        assert_ne!(before, after);
        assert_eq!(store.changes_since_persist, 0);
    }

    #[test]
    fn flush_if_pending_persists_partial_batch() {
        let (mut store, path) = store_with_fake(10);
        let token = ResumeToken::from_document(doc! { "_data": "T" });
        store.update_resume_token("a.b", token).unwrap();

        let before = store.writer.read(&path).unwrap();
        store.flush_if_pending().unwrap();
        let after = store.writer.read(&path).unwrap();
        assert_ne!(before, after);
        assert_eq!(store.changes_since_persist, 0);
    }

    #[test]
    fn flush_if_pending_is_noop_when_nothing_pending() {
        let (mut store, path) = store_with_fake(10);
        store.persist().unwrap();
        let before = store.writer.read(&path).unwrap();
        store.flush_if_pending().unwrap();
        let after = store.writer.read(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn record_operation_updates_stats() {
        let (mut store, _) = store_with_fake(10);
        store.record_operation(OperationKind::Insert);
        store.record_operation(OperationKind::Delete);
        let stats = store.get_stats();
        assert_eq!(stats.total_synced, 2);
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.deletes, 1);
    }

    #[test]
    fn reset_clears_state_and_removes_file() {
        let (mut store, path) = store_with_fake(10);
        let token = ResumeToken::from_document(doc! { "_data": "T" });
        store.update_resume_token("a.b", token).unwrap();
        store.persist().unwrap();
        assert!(store.writer.read(&path).unwrap().is_some());

        store.reset().unwrap();
        assert!(store.writer.read(&path).unwrap().is_none());
        assert_eq!(store.get_resume_token("a.b"), None);
        assert_eq!(store.get_stats(), SyncStats::default());
    }

    #[test]
    fn corrupted_state_file_starts_fresh_without_data_loss_panic() {
        let writer = FakeStateWriter::new();
        let path = PathBuf::from("/state/sync.json");
        writer.seed(&path, b"not valid json".to_vec());
        let store = StateStore::load_with_writer(writer, path, 10).unwrap();
        assert_eq!(store.get_stats(), SyncStats::default());
    }
}
