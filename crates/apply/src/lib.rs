// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Idempotent application of source change events to the target database.
//!
//! Every write is an upsert-by-`_id` replace or an `_id` delete, so replayed
//! events (after a crash and resume) converge to the same target state
//! rather than erroring or duplicating data.

mod target;

pub use target::{ApplyError, MongoTarget, TargetWriter};

use docsync_core::{extract_document_id, ChangeEvent, EventKind, Namespace, OperationKind};
use tracing::{debug, info, warn};

/// What happened when a single change event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The write succeeded and should be counted under `kind`.
    Applied(OperationKind),
    /// Nothing was written — an unrecoverable per-document condition
    /// (missing namespace, missing full document, missing key) that is
    /// logged and skipped rather than treated as fatal.
    Skipped,
    /// The source change stream was invalidated; the caller must stop
    /// consuming this stream and reopen it.
    Invalidated,
}

/// Apply a single change event to `target`.
///
/// Mirrors the dispatch table of the source sync engine: insert/update/
/// replace upsert the full document by `_id`; delete removes by `_id`;
/// drop/dropDatabase best-effort mirror the structural change; invalidate
/// signals the caller to reopen the stream; anything else is ignored.
pub async fn apply_change(
    target: &dyn TargetWriter,
    event: &ChangeEvent,
) -> Result<ApplyOutcome, ApplyError> {
    let Some(ns) = event.ns.as_ref() else {
        if matches!(event.kind, EventKind::Invalidate) {
            warn!("change stream invalidated");
            return Ok(ApplyOutcome::Invalidated);
        }
        warn!("change event missing namespace, skipping");
        return Ok(ApplyOutcome::Skipped);
    };

    match &event.kind {
        EventKind::Insert { full_document } => {
            apply_upsert(target, ns, event, full_document.as_ref(), OperationKind::Insert).await
        }
        EventKind::Update { full_document } | EventKind::Replace { full_document } => {
            apply_upsert(target, ns, event, full_document.as_ref(), OperationKind::Update).await
        }
        EventKind::Delete => apply_delete(target, ns, event).await,
        EventKind::Drop => {
            info!(db = %ns.db, coll = %ns.coll, "drop collection");
            if let Err(e) = target.drop_collection(&ns.db, &ns.coll).await {
                warn!(db = %ns.db, coll = %ns.coll, error = %e, "could not drop collection on target");
            }
            Ok(ApplyOutcome::Skipped)
        }
        EventKind::DropDatabase => {
            info!(db = %ns.db, "drop database");
            if let Err(e) = target.drop_database(&ns.db).await {
                warn!(db = %ns.db, error = %e, "could not drop database on target");
            }
            Ok(ApplyOutcome::Skipped)
        }
        EventKind::Invalidate => {
            warn!("change stream invalidated");
            Ok(ApplyOutcome::Invalidated)
        }
        EventKind::Other(op) => {
            debug!(operation = %op, "ignoring operation type");
            Ok(ApplyOutcome::Skipped)
        }
    }
}

async fn apply_upsert(
    target: &dyn TargetWriter,
    ns: &Namespace,
    event: &ChangeEvent,
    full_document: Option<&bson::Document>,
    kind: OperationKind,
) -> Result<ApplyOutcome, ApplyError> {
    let Some(full_document) = full_document else {
        warn!(
            db = %ns.db,
            coll = %ns.coll,
            "{} without fullDocument (doc may be deleted)",
            kind_label(kind)
        );
        return Ok(ApplyOutcome::Skipped);
    };

    let Some(doc_id) = extract_document_id(event.document_key.as_ref(), Some(full_document)) else {
        warn!(db = %ns.db, coll = %ns.coll, "could not determine document id, skipping");
        return Ok(ApplyOutcome::Skipped);
    };

    let mut replacement = full_document.clone();
    replacement.remove("_id");

    target
        .replace_one(&ns.db, &ns.coll, &doc_id, replacement)
        .await?;

    debug!(db = %ns.db, coll = %ns.coll, id = ?doc_id, "{}", kind_label(kind));
    Ok(ApplyOutcome::Applied(kind))
}

async fn apply_delete(
    target: &dyn TargetWriter,
    ns: &Namespace,
    event: &ChangeEvent,
) -> Result<ApplyOutcome, ApplyError> {
    let Some(doc_id) = extract_document_id(event.document_key.as_ref(), None) else {
        warn!(db = %ns.db, coll = %ns.coll, "delete without document key");
        return Ok(ApplyOutcome::Skipped);
    };

    target.delete_one(&ns.db, &ns.coll, &doc_id).await?;

    debug!(db = %ns.db, coll = %ns.coll, id = ?doc_id, "delete");
    Ok(ApplyOutcome::Applied(OperationKind::Delete))
}

fn kind_label(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Insert => "insert",
        OperationKind::Update => "update",
        OperationKind::Replace => "replace",
        OperationKind::Delete => "delete",
        OperationKind::Error => "error",
    }
}
