// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A fully-qualified collection reference, canonically `"database.collection"`.
///
/// The set of watch targets is fixed at start-up for the lifetime of a
/// sync process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchTarget {
    pub database: String,
    pub collection: String,
}

impl WatchTarget {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Canonical `"database.collection"` string used as the state-file key.
    pub fn key(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Error)]
#[error("invalid collection spec '{0}', expected 'database.collection'")]
pub struct WatchTargetParseError(pub String);

impl FromStr for WatchTarget {
    type Err = WatchTargetParseError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        match spec.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => {
                Ok(WatchTarget::new(db, coll))
            }
            _ => Err(WatchTargetParseError(spec.to_string())),
        }
    }
}
