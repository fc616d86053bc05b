//! # In-Memory Store
//!
//! Keeps the collection in a `Vec` behind a `parking_lot::RwLock`. Scans clone
//! the vector under the read lock, so a cursor never holds the lock and always
//! sees the collection as it was when the scan opened.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use uuid::Uuid;

use docbridge_common::{Document, DocumentId};

use crate::store::{DocumentCursor, DocumentStore, StoreError, StoreResult};

/// Volatile document store used by default and in tests.
pub struct MemoryStore {
    address: String,
    documents: RwLock<Vec<Document>>,
    disconnected: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty collection addressed as `database.collection`.
    pub fn new(database: &str, collection: &str) -> Self {
        MemoryStore {
            address: format!("memory://{database}.{collection}"),
            documents: RwLock::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_connected(&self) -> StoreResult<()> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(StoreError::Disconnected);
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn insert_one(&self, mut document: Document) -> StoreResult<DocumentId> {
        self.ensure_connected()?;
        let id = document.ensure_id(|| Uuid::new_v4().to_string());
        self.documents.write().push(document);
        Ok(id)
    }

    fn scan_all(&self) -> StoreResult<DocumentCursor> {
        self.ensure_connected()?;
        let snapshot = self.documents.read().clone();
        Ok(Box::new(snapshot.into_iter().map(Ok::<Document, StoreError>)))
    }

    fn disconnect(&self) -> StoreResult<()> {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Disconnected);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.address.clone()
    }
}
