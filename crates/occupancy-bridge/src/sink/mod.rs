// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dual write of readings to the document store.
//!
//! Every reading is written twice:
//!
//! ```text
//! Reading --stamp--> Payload --set_document----> live record (overwrite)
//!                           \--append_document-> history log (new id)
//! ```
//!
//! The live record is authoritative. A failed live write aborts the reading;
//! a failed history append is logged and the write still counts as a
//! partial success. Nothing is retried or queued.

mod firestore;
mod memory;

pub use firestore::{FirestoreConfig, FirestoreStore, DEFAULT_DATABASE, DEFAULT_FIRESTORE_URL};
pub use memory::MemoryStore;

use crate::reading::{Payload, Reading};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Identifier assigned by the store to an appended document.
pub type DocumentId = String;

/// Source of write timestamps.
pub type Clock = fn() -> DateTime<Utc>;

/// Application id the dashboard reads from.
pub const DEFAULT_APP_ID: &str = "trichy-iot-counter";

/// Errors returned by a [`DocumentStore`] backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network failure, timeout, or the request never got a response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The store answered with a non-success status.
    #[error("store rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    /// The store answered, but not with what we expected.
    #[error("malformed store response: {0}")]
    Malformed(String),
    /// The backend refuses the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Remote document store operations consumed by the bridge.
///
/// # Implementations
///
/// - [`FirestoreStore`] -- Cloud Firestore REST API (or its emulator)
/// - [`MemoryStore`] -- in-process, for tests and dry runs
pub trait DocumentStore {
    /// Create or fully replace the document at `path`.
    fn set_document(&self, path: &str, payload: &Payload) -> Result<(), StoreError>;

    /// Add a new document to `collection` under a store-generated id.
    fn append_document(&self, collection: &str, payload: &Payload)
        -> Result<DocumentId, StoreError>;
}

/// Where the live record and the history log live in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPaths {
    /// Single document overwritten on every reading.
    pub live_document: String,
    /// Collection receiving one new document per reading.
    pub history_collection: String,
}

impl DocumentPaths {
    /// Layout used by the dashboard for a given application id.
    pub fn for_app(app_id: &str) -> Self {
        let live_document = format!("artifacts/{}/public/data/sensor_readings/latest", app_id);
        let history_collection = format!("{}/history", live_document);
        Self {
            live_document,
            history_collection,
        }
    }
}

impl Default for DocumentPaths {
    fn default() -> Self {
        Self::for_app(DEFAULT_APP_ID)
    }
}

/// Failures of the dual write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The live record could not be written; history was not attempted.
    #[error("live write failed: {0}")]
    LiveWriteFailed(#[source] StoreError),
    /// The live record was written but the history append failed.
    #[error("history write failed: {0}")]
    HistoryWriteFailed(#[source] StoreError),
}

/// Outcome of a write that at least updated the live record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAck {
    /// Both the live record and the history entry were written.
    Complete {
        payload: Payload,
        history_id: DocumentId,
    },
    /// Live record written, history entry lost.
    Partial { payload: Payload, cause: SinkError },
}

impl WriteAck {
    pub fn payload(&self) -> &Payload {
        match self {
            WriteAck::Complete { payload, .. } | WriteAck::Partial { payload, .. } => payload,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, WriteAck::Complete { .. })
    }
}

/// Performs the live overwrite + history append for each reading.
pub struct SinkWriter<D: DocumentStore> {
    store: D,
    paths: DocumentPaths,
    clock: Clock,
}

impl<D: DocumentStore> SinkWriter<D> {
    pub fn new(store: D, paths: DocumentPaths) -> Self {
        Self::with_clock(store, paths, Utc::now)
    }

    /// Use a custom timestamp source.
    pub fn with_clock(store: D, paths: DocumentPaths, clock: Clock) -> Self {
        Self {
            store,
            paths,
            clock,
        }
    }

    pub fn paths(&self) -> &DocumentPaths {
        &self.paths
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    /// Stamp `reading` with the current time and write it to both places.
    ///
    /// Two calls with the same reading produce two distinct history entries
    /// and leave the live record holding the second call's payload.
    pub fn write(&self, reading: &Reading) -> Result<WriteAck, SinkError> {
        let payload = Payload::stamp(reading, (self.clock)());

        self.store
            .set_document(&self.paths.live_document, &payload)
            .map_err(SinkError::LiveWriteFailed)?;

        match self
            .store
            .append_document(&self.paths.history_collection, &payload)
        {
            Ok(history_id) => {
                tracing::debug!(id = %history_id, "Logged historical record");
                Ok(WriteAck::Complete {
                    payload,
                    history_id,
                })
            }
            Err(e) => {
                let cause = SinkError::HistoryWriteFailed(e);
                tracing::warn!(count = payload.count, "{}", cause);
                Ok(WriteAck::Partial { payload, cause })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    static TICK: AtomicI64 = AtomicI64::new(1_700_000_000);

    fn ticking_clock() -> DateTime<Utc> {
        let secs = TICK.fetch_add(1, Ordering::SeqCst);
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }

    fn writer(store: &MemoryStore) -> SinkWriter<MemoryStore> {
        SinkWriter::with_clock(store.clone(), DocumentPaths::default(), ticking_clock)
    }

    #[test]
    fn test_default_paths() {
        let paths = DocumentPaths::default();
        assert_eq!(
            paths.live_document,
            "artifacts/trichy-iot-counter/public/data/sensor_readings/latest"
        );
        assert_eq!(
            paths.history_collection,
            "artifacts/trichy-iot-counter/public/data/sensor_readings/latest/history"
        );
    }

    #[test]
    fn test_write_complete() {
        let store = MemoryStore::new();
        let ack = writer(&store)
            .write(&Reading::new(3, 120, "ON"))
            .expect("write");

        assert!(ack.is_complete());
        let live = store
            .document(&DocumentPaths::default().live_document)
            .expect("live record");
        assert_eq!(&live, ack.payload());
        assert_eq!(
            store.collection(&DocumentPaths::default().history_collection),
            vec![live]
        );
    }

    #[test]
    fn test_live_write_is_idempotent_and_second_wins() {
        let store = MemoryStore::new();
        let writer = writer(&store);
        let reading = Reading::new(1, 10, "ON");

        let first = writer.write(&reading).expect("first");
        let second = writer.write(&reading).expect("second");
        assert_ne!(first.payload().timestamp, second.payload().timestamp);

        assert_eq!(store.document_count(), 1);
        let live = store.document(&writer.paths().live_document).expect("live");
        assert_eq!(&live, second.payload());
    }

    #[test]
    fn test_history_append_is_not_idempotent() {
        let store = MemoryStore::new();
        let writer = writer(&store);
        let reading = Reading::new(0, 5, "OFF");

        let a = writer.write(&reading).expect("first");
        let b = writer.write(&reading).expect("second");

        let ids = match (a, b) {
            (
                WriteAck::Complete { history_id: a, .. },
                WriteAck::Complete { history_id: b, .. },
            ) => (a, b),
            other => panic!("expected two complete writes, got: {:?}", other),
        };
        assert_ne!(ids.0, ids.1);
        assert_eq!(store.collection(&writer.paths().history_collection).len(), 2);
    }

    #[test]
    fn test_live_failure_skips_history() {
        let store = MemoryStore::new();
        store.fail_live(true);

        let err = writer(&store)
            .write(&Reading::new(2, 3, "ON"))
            .unwrap_err();
        assert!(matches!(err, SinkError::LiveWriteFailed(_)));
        assert_eq!(store.document_count(), 0);
        assert!(store
            .collection(&DocumentPaths::default().history_collection)
            .is_empty());
    }

    #[test]
    fn test_history_failure_is_partial_success() {
        let store = MemoryStore::new();
        store.fail_history(true);

        let ack = writer(&store)
            .write(&Reading::new(2, 3, "ON"))
            .expect("partial write is still Ok");
        match &ack {
            WriteAck::Partial { cause, .. } => {
                assert!(matches!(cause, SinkError::HistoryWriteFailed(_)))
            }
            other => panic!("expected Partial, got: {:?}", other),
        }
        assert!(store
            .document(&DocumentPaths::default().live_document)
            .is_some());
    }

    #[test]
    fn test_event_is_derived_at_write_time() {
        let store = MemoryStore::new();
        let ack = writer(&store).write(&Reading::new(0, 0, "OFF")).expect("write");
        assert_eq!(ack.payload().event, crate::reading::Event::Empty);
    }
}
