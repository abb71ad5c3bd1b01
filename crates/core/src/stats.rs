// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Counters tracked for the lifetime of a state file, surviving restarts.
///
/// `total_synced` is incremented on every `record_operation` call
/// regardless of kind, including errors — it does not necessarily equal
/// `inserts + updates + deletes + errors` (e.g. a recorded `replace` also
/// counts as `updates`, and some recorded kinds count toward neither).
/// This mirrors the original sync service's contract exactly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    #[serde(default)]
    pub total_synced: u64,
    #[serde(default)]
    pub inserts: u64,
    #[serde(default)]
    pub updates: u64,
    #[serde(default)]
    pub deletes: u64,
    #[serde(default)]
    pub errors: u64,
}

/// The kind of operation recorded against `SyncStats`.
///
/// `Update` and `Replace` both map to the `updates` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Replace,
    Delete,
    Error,
}

impl SyncStats {
    pub fn record(&mut self, kind: OperationKind) {
        self.total_synced += 1;
        match kind {
            OperationKind::Insert => self.inserts += 1,
            OperationKind::Update | OperationKind::Replace => self.updates += 1,
            OperationKind::Delete => self.deletes += 1,
            OperationKind::Error => self.errors += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_increments_total_and_bucket() {
        let mut stats = SyncStats::default();
        stats.record(OperationKind::Insert);
        stats.record(OperationKind::Update);
        stats.record(OperationKind::Replace);
        stats.record(OperationKind::Delete);
        stats.record(OperationKind::Error);

        assert_eq!(stats.total_synced, 5);
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.updates, 2);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn default_is_all_zero() {
        assert_eq!(SyncStats::default(), SyncStats {
            total_synced: 0,
            inserts: 0,
            updates: 0,
            deletes: 0,
            errors: 0,
        });
    }
}
