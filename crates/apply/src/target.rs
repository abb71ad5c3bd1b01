// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use mongodb::options::ReplaceOptions;
use mongodb::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("target write failed: {0}")]
    WriteFailure(#[from] mongodb::error::Error),
}

/// The target-side write surface the applier needs.
///
/// Abstracted behind a trait (rather than calling `mongodb::Client` directly
/// from the dispatch logic) so the idempotent-apply invariants can be tested
/// against an in-memory fake instead of a live server, the same way
/// `docsync-stream`'s `WatchStream` stands in for a real change cursor.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Upsert `body` at `{_id: id}` in `db.coll`.
    async fn replace_one(
        &self,
        db: &str,
        coll: &str,
        id: &bson::Bson,
        body: bson::Document,
    ) -> Result<(), ApplyError>;

    /// Delete the document at `{_id: id}` in `db.coll`, if present.
    async fn delete_one(&self, db: &str, coll: &str, id: &bson::Bson) -> Result<(), ApplyError>;

    /// Drop `db.coll`. Dropping an absent collection is not an error.
    async fn drop_collection(&self, db: &str, coll: &str) -> Result<(), ApplyError>;

    /// Drop `db`. Dropping an absent database is not an error.
    async fn drop_database(&self, db: &str) -> Result<(), ApplyError>;
}

/// Production `TargetWriter` backed by a real driver `Client`.
pub struct MongoTarget {
    client: Client,
}

impl MongoTarget {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TargetWriter for MongoTarget {
    async fn replace_one(
        &self,
        db: &str,
        coll: &str,
        id: &bson::Bson,
        body: bson::Document,
    ) -> Result<(), ApplyError> {
        let collection = self.client.database(db).collection::<bson::Document>(coll);
        let options = ReplaceOptions::builder().upsert(true).build();
        collection
            .replace_one(bson::doc! { "_id": id.clone() }, body)
            .with_options(options)
            .await?;
        Ok(())
    }

    async fn delete_one(&self, db: &str, coll: &str, id: &bson::Bson) -> Result<(), ApplyError> {
        let collection = self.client.database(db).collection::<bson::Document>(coll);
        collection.delete_one(bson::doc! { "_id": id.clone() }).await?;
        Ok(())
    }

    async fn drop_collection(&self, db: &str, coll: &str) -> Result<(), ApplyError> {
        self.client
            .database(db)
            .collection::<bson::Document>(coll)
            .drop()
            .await?;
        Ok(())
    }

    async fn drop_database(&self, db: &str) -> Result<(), ApplyError> {
        self.client.database(db).drop().await?;
        Ok(())
    }
}
