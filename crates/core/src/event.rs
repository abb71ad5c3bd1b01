// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// An opaque resume token produced by the source change feed.
///
/// The engine carries this verbatim and never interprets its contents
/// beyond the fact that it round-trips through JSON. Structurally it is a
/// small BSON document (at minimum a `_data` field holding a hex string),
/// but callers must not rely on that shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(pub bson::Document);

impl ResumeToken {
    pub fn from_document(doc: bson::Document) -> Self {
        Self(doc)
    }
}

/// Source namespace `{db, coll}` carried on a change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

/// Per-variant payload for a change event, tagged by `operationType`.
///
/// Modeling this as a tagged union (rather than passing the raw event map
/// around) means identity extraction can operate on a shared envelope
/// while payload access stays per-variant and exhaustive-matched at the
/// applier.
#[derive(Debug, Clone)]
pub enum EventKind {
    Insert {
        full_document: Option<bson::Document>,
    },
    Update {
        full_document: Option<bson::Document>,
    },
    Replace {
        full_document: Option<bson::Document>,
    },
    Delete,
    Drop,
    DropDatabase,
    Invalidate,
    /// Any operation type the engine does not act on (e.g. `rename`).
    Other(String),
}

impl EventKind {
    pub fn operation_type(&self) -> &str {
        match self {
            EventKind::Insert { .. } => "insert",
            EventKind::Update { .. } => "update",
            EventKind::Replace { .. } => "replace",
            EventKind::Delete => "delete",
            EventKind::Drop => "drop",
            EventKind::DropDatabase => "dropDatabase",
            EventKind::Invalidate => "invalidate",
            EventKind::Other(op) => op,
        }
    }
}

/// A single mutation observed on a source change feed.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: EventKind,
    /// Absent for `invalidate` and some malformed events.
    pub ns: Option<Namespace>,
    /// The affected document's identity mapping, conventionally `{_id: ...}`
    /// but tolerated under an empty-string key from some source variants.
    pub document_key: Option<bson::Document>,
    /// This event's own id — which IS the resume token for this position
    /// in the source feed.
    pub id: ResumeToken,
}

/// Extract the document identity from a change event's envelope.
///
/// Tries, in order:
/// 1. `document_key["_id"]` — standard shape.
/// 2. `document_key[""]` — some source variants emit the key under an
///    empty string.
/// 3. `full_document["_id"]` — fallback to the post-image, when present.
/// 4. The first value in `document_key`'s iteration order — last resort.
///
/// Returns `None` if no identity can be determined.
pub fn extract_document_id(
    document_key: Option<&bson::Document>,
    full_document: Option<&bson::Document>,
) -> Option<bson::Bson> {
    if let Some(key) = document_key {
        if let Some(id) = key.get("_id") {
            return Some(id.clone());
        }
        if let Some(id) = key.get("") {
            return Some(id.clone());
        }
    }
    if let Some(doc) = full_document {
        if let Some(id) = doc.get("_id") {
            return Some(id.clone());
        }
    }
    document_key.and_then(|key| key.iter().next().map(|(_, v)| v.clone()))
}
