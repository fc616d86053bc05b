//! # MongoDB Store
//!
//! Bridges to a MongoDB collection through the driver's synchronous API.
//! Documents cross the boundary as relaxed extended JSON, so ObjectIds come
//! back as `{"$oid": "…"}` in scans.
//!
//! The sync driver blocks on its own runtime: construct and call it from a
//! blocking thread (`spawn_blocking`), never from an async task directly.

use std::sync::atomic::{AtomicBool, Ordering};

use mongodb::bson::{self, doc, Bson};
use mongodb::error::ErrorKind;
use mongodb::sync::{Client, Collection};

use docbridge_common::{Document, DocumentId};

use crate::store::{DocumentCursor, DocumentStore, StoreError, StoreResult};

/// Store backed by one MongoDB collection.
pub struct MongoStore {
    collection: Collection<bson::Document>,
    address: String,
    disconnected: AtomicBool,
}

impl MongoStore {
    /// Connects and pings the deployment so an unreachable store fails here.
    pub fn connect(uri: &str, database: &str, collection: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).map_err(map_error)?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .map_err(map_error)?;
        let collection = client.database(database).collection::<bson::Document>(collection);

        Ok(MongoStore {
            address: format!("{uri} {database}.{}", collection.name()),
            collection,
            disconnected: AtomicBool::new(false),
        })
    }

    fn ensure_connected(&self) -> StoreResult<()> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(StoreError::Disconnected);
        }
        Ok(())
    }
}

impl DocumentStore for MongoStore {
    fn insert_one(&self, document: Document) -> StoreResult<DocumentId> {
        self.ensure_connected()?;
        let bson_doc = to_bson_document(document)?;
        let result = self.collection.insert_one(bson_doc, None).map_err(map_error)?;
        Ok(match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::String(id) => id,
            other => other.to_string(),
        })
    }

    fn scan_all(&self) -> StoreResult<DocumentCursor> {
        self.ensure_connected()?;
        let cursor = self.collection.find(None, None).map_err(map_error)?;
        Ok(Box::new(cursor.map(|item| {
            let raw = item.map_err(map_error)?;
            Document::from_value(Bson::Document(raw).into_relaxed_extjson())
                .map_err(|err| StoreError::Backend(err.to_string()))
        })))
    }

    fn disconnect(&self) -> StoreResult<()> {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Disconnected);
        }
        // The driver closes its pool once the collection handle drops.
        Ok(())
    }

    fn describe(&self) -> String {
        self.address.clone()
    }
}

/// Converts a document body, read as extended JSON, into BSON.
///
/// Bodies that misuse extended JSON keys (`{"$date": "nope"}`) are the
/// client's fault, so they surface as `InvalidDocument`.
fn to_bson_document(document: Document) -> StoreResult<bson::Document> {
    match Bson::try_from(document.into_value()) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(_) => Err(StoreError::InvalidDocument("document is not an object".into())),
        Err(err) => Err(StoreError::InvalidDocument(err.to_string())),
    }
}

fn map_error(err: mongodb::error::Error) -> StoreError {
    match *err.kind {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}
