// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use docsync_core::{ChangeEvent, ResumeToken, WatchTarget};
use futures::StreamExt;
use mongodb::options::{ChangeStreamOptions, FullDocumentType};
use mongodb::Client;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversion::convert_event;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("driver error: {0}")]
    Driver(#[from] mongodb::error::Error),
    #[error("no collections specified to watch")]
    NoTargets,
    #[error("failed to open any collection change stream")]
    NoStreamsOpened,
}

/// A single collection's change feed, abstracted for testability.
///
/// The real implementation wraps a driver `ChangeStream`; tests substitute a
/// fake that yields a scripted sequence of events.
#[async_trait]
pub trait WatchStream: Send {
    /// Poll for the next event, waiting at most `timeout` before giving up
    /// for this sweep. `Ok(None)` means "nothing available right now", not
    /// that the stream has ended.
    async fn try_next(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, StreamError>;

    async fn close(&mut self);
}

/// Production `WatchStream` backed by a real driver change stream.
pub struct MongoWatchStream {
    inner: mongodb::change_stream::ChangeStream<bson::Document>,
}

#[async_trait]
impl WatchStream for MongoWatchStream {
    async fn try_next(&mut self, timeout: Duration) -> Result<Option<ChangeEvent>, StreamError> {
        match tokio::time::timeout(timeout, self.inner.next()).await {
            Ok(Some(Ok(event))) => Ok(Some(convert_event(event))),
            Ok(Some(Err(e))) => Err(StreamError::Driver(e)),
            Ok(None) => Ok(None),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn close(&mut self) {
        // The driver's ChangeStream closes its cursor when dropped; there is
        // no explicit close call to await here, matching `Drop`-based
        // cleanup elsewhere in the driver API.
    }
}

/// Open one collection-level change stream per watch target, each seeded
/// with its own stored resume token if one exists.
pub async fn open_streams(
    client: &Client,
    targets: &[WatchTarget],
    resume_tokens: &HashMap<String, Option<ResumeToken>>,
) -> Result<Multiplexer, StreamError> {
    if targets.is_empty() {
        return Err(StreamError::NoTargets);
    }

    info!(count = targets.len(), "opening collection-level change streams");
    let mut streams: Vec<Box<dyn WatchStream>> = Vec::new();
    let mut names = Vec::new();

    for target in targets {
        let collection = client
            .database(&target.database)
            .collection::<bson::Document>(&target.collection);

        let mut options = ChangeStreamOptions::builder()
            .full_document(Some(FullDocumentType::UpdateLookup))
            .batch_size(Some(100))
            .max_await_time(Some(Duration::from_millis(5000)))
            .build();

        let resumed = match resume_tokens.get(&target.key()).and_then(|t| t.clone()) {
            Some(token) => {
                match bson::from_document(token.0.clone()) {
                    Ok(resume_after) => {
                        options.resume_after = Some(resume_after);
                        true
                    }
                    Err(e) => {
                        warn!(target = %target, error = %e, "stored resume token unusable, watching from current position");
                        false
                    }
                }
            }
            None => false,
        };

        match collection.watch().with_options(options).await {
            Ok(stream) => {
                info!(target = %target, resuming = resumed, "watching collection");
                streams.push(Box::new(MongoWatchStream { inner: stream }));
                names.push(target.clone());
            }
            Err(e) => {
                warn!(target = %target, error = %e, "failed to watch collection");
            }
        }
    }

    if streams.is_empty() {
        return Err(StreamError::NoStreamsOpened);
    }

    Ok(Multiplexer::new(streams, names))
}

/// Aggregates multiple per-collection change streams into a single
/// round-robin iterator, tagging each yielded event with its source target.
pub struct Multiplexer {
    streams: Vec<Box<dyn WatchStream>>,
    targets: Vec<WatchTarget>,
    next_index: usize,
    per_stream_timeout: Duration,
}

impl Multiplexer {
    pub fn new(streams: Vec<Box<dyn WatchStream>>, targets: Vec<WatchTarget>) -> Self {
        Self {
            streams,
            targets,
            next_index: 0,
            per_stream_timeout: Duration::from_millis(50),
        }
    }

    pub fn with_per_stream_timeout(mut self, timeout: Duration) -> Self {
        self.per_stream_timeout = timeout;
        self
    }

    /// Sweep every stream once, round-robin, returning the first event
    /// found. Errors reading an individual stream are logged and skipped —
    /// a malfunctioning collection must not stall the others.
    pub async fn try_next(&mut self) -> (Option<WatchTarget>, Option<ChangeEvent>) {
        if self.streams.is_empty() {
            return (None, None);
        }

        let count = self.streams.len();
        for _ in 0..count {
            let idx = self.next_index;
            self.next_index = (self.next_index + 1) % count;

            match self.streams[idx].try_next(self.per_stream_timeout).await {
                Ok(Some(event)) => return (Some(self.targets[idx].clone()), Some(event)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(target = %self.targets[idx], error = %e, "error reading from stream");
                    continue;
                }
            }
        }

        (None, None)
    }

    pub async fn close(&mut self) {
        for stream in &mut self.streams {
            stream.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docsync_core::EventKind;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeWatchStream {
        queue: Mutex<VecDeque<Option<ChangeEvent>>>,
        closed: Mutex<bool>,
    }

    impl FakeWatchStream {
        fn new(events: Vec<Option<ChangeEvent>>) -> Self {
            Self {
                queue: Mutex::new(events.into()),
                closed: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl WatchStream for FakeWatchStream {
        async fn try_next(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<ChangeEvent>, StreamError> {
            Ok(self.queue.lock().unwrap().pop_front().flatten())
        }

        async fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn sample_event() -> ChangeEvent {
        ChangeEvent {
            kind: EventKind::Insert {
                full_document: Some(doc! { "_id": "x", "v": 1 }),
            },
            ns: None,
            document_key: Some(doc! { "_id": "x" }),
            id: ResumeToken::from_document(doc! { "_data": "T1" }),
        }
    }

    #[tokio::test]
    async fn round_robins_across_streams() {
        let a = FakeWatchStream::new(vec![None, Some(sample_event())]);
        let b = FakeWatchStream::new(vec![Some(sample_event()), None]);
        let mut mux = Multiplexer::new(
            vec![Box::new(a), Box::new(b)],
            vec![WatchTarget::new("db", "a"), WatchTarget::new("db", "b")],
        );

        // sweep starts at stream 0 (a): a has None this round, b has an event.
        let (target, event) = mux.try_next().await;
        assert_eq!(target, Some(WatchTarget::new("db", "b")));
        assert!(event.is_some());
    }

    #[tokio::test]
    async fn returns_none_when_all_streams_empty() {
        let a = FakeWatchStream::new(vec![None]);
        let mut mux = Multiplexer::new(vec![Box::new(a)], vec![WatchTarget::new("db", "a")]);
        let (target, event) = mux.try_next().await;
        assert_eq!(target, None);
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn empty_multiplexer_returns_none_immediately() {
        let mut mux = Multiplexer::new(vec![], vec![]);
        assert!(mux.is_empty());
        let (target, event) = mux.try_next().await;
        assert_eq!(target, None);
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn close_closes_every_stream() {
        let a = FakeWatchStream::new(vec![]);
        let mut mux = Multiplexer::new(vec![Box::new(a)], vec![WatchTarget::new("db", "a")]);
        mux.close().await;
    }
}
