// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::ResumeToken;
use crate::stats::SyncStats;

/// The on-disk shape of the sync engine's persisted state.
///
/// ```json
/// {
///   "resume_tokens": { "<db.coll>": <ResumeToken|null>, ... },
///   "last_sync_time": "<ISO-8601 UTC, suffix Z>",
///   "sync_stats": { ...SyncStats... }
/// }
/// ```
///
/// After any successful flush this parses and contains a `resume_tokens`
/// entry (possibly null) for every watch target declared at start-up.
/// `last_sync_time` is stored pre-formatted (rather than as a typed
/// timestamp) so the on-disk suffix is always `Z`, matching the original
/// service's `datetime.utcnow().isoformat() + "Z"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStateFile {
    #[serde(default)]
    pub resume_tokens: HashMap<String, Option<ResumeToken>>,
    #[serde(default)]
    pub last_sync_time: Option<String>,
    #[serde(default)]
    pub sync_stats: SyncStats,
}
