// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process document store.

use super::{DocumentId, DocumentStore, StoreError};
use crate::reading::Payload;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<String, Payload>,
    collections: BTreeMap<String, Vec<(DocumentId, Payload)>>,
    next_id: u64,
    fail_live: bool,
    fail_history: bool,
}

/// Document store kept in memory.
///
/// Clones share the same contents, so a test can hand one clone to the
/// bridge and inspect the other. Failures can be switched on per operation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every `set_document` fail until switched off.
    pub fn fail_live(&self, fail: bool) {
        self.lock().fail_live = fail;
    }

    /// Make every `append_document` fail until switched off.
    pub fn fail_history(&self, fail: bool) {
        self.lock().fail_history = fail;
    }

    /// Current content of a single document.
    pub fn document(&self, path: &str) -> Option<Payload> {
        self.lock().documents.get(path).cloned()
    }

    /// Number of documents written with `set_document`.
    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }

    /// Appended documents of a collection, oldest first.
    pub fn collection(&self, path: &str) -> Vec<Payload> {
        self.lock()
            .collections
            .get(path)
            .map(|docs| docs.iter().map(|(_, p)| p.clone()).collect())
            .unwrap_or_default()
    }
}

impl DocumentStore for MemoryStore {
    fn set_document(&self, path: &str, payload: &Payload) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_live {
            return Err(StoreError::Unavailable(format!("set {} refused", path)));
        }
        inner.documents.insert(path.to_string(), payload.clone());
        Ok(())
    }

    fn append_document(
        &self,
        collection: &str,
        payload: &Payload,
    ) -> Result<DocumentId, StoreError> {
        let mut inner = self.lock();
        if inner.fail_history {
            return Err(StoreError::Unavailable(format!(
                "append to {} refused",
                collection
            )));
        }
        inner.next_id += 1;
        let id = format!("mem-{:08}", inner.next_id);
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), payload.clone()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Reading;
    use chrono::Utc;

    #[test]
    fn test_clones_share_contents() {
        let store = MemoryStore::new();
        let other = store.clone();
        let payload = Payload::stamp(&Reading::new(1, 1, "ON"), Utc::now());

        other.set_document("a/b", &payload).expect("set");
        assert_eq!(store.document("a/b"), Some(payload));
    }

    #[test]
    fn test_failure_switches() {
        let store = MemoryStore::new();
        let payload = Payload::stamp(&Reading::new(1, 1, "ON"), Utc::now());

        store.fail_history(true);
        assert!(store.append_document("c", &payload).is_err());
        store.fail_history(false);
        assert_eq!(store.append_document("c", &payload), Ok("mem-00000001".to_string()));
        assert_eq!(store.collection("c").len(), 1);
    }
}
