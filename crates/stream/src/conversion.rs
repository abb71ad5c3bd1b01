// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use docsync_core::{ChangeEvent, EventKind, Namespace, ResumeToken};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};

/// Convert a driver-native change event into this engine's event model.
///
/// The driver's `id` field (the event's resume token) is re-serialized into
/// a plain `bson::Document` rather than carried as the driver's own
/// `ResumeToken` type, so downstream crates depend on `docsync-core` alone.
pub fn convert_event(event: ChangeStreamEvent<bson::Document>) -> ChangeEvent {
    let ns = event.ns.map(|ns| Namespace {
        db: ns.db,
        coll: ns.coll.unwrap_or_default(),
    });

    let kind = match event.operation_type {
        OperationType::Insert => EventKind::Insert {
            full_document: event.full_document,
        },
        OperationType::Update => EventKind::Update {
            full_document: event.full_document,
        },
        OperationType::Replace => EventKind::Replace {
            full_document: event.full_document,
        },
        OperationType::Delete => EventKind::Delete,
        OperationType::Drop => EventKind::Drop,
        OperationType::DropDatabase => EventKind::DropDatabase,
        OperationType::Invalidate => EventKind::Invalidate,
        other => EventKind::Other(format!("{other:?}")),
    };

    let id = bson::to_document(&event.id)
        .map(ResumeToken::from_document)
        .unwrap_or_else(|_| ResumeToken::from_document(bson::Document::new()));

    ChangeEvent {
        kind,
        ns,
        document_key: event.document_key,
        id,
    }
}
