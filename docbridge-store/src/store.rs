//! # Document Store Interface
//!
//! ## Design Principles
//!
//! 1. **Strategy Pattern**: Abstract the store behind a trait so the in-memory,
//!    file and MongoDB backends can be swapped without touching the server.
//! 2. **One Handle Per Process**: A store is connected once at startup, shared
//!    behind an `Arc`, and disconnected exactly once at shutdown.
//! 3. **Lazy Scans**: Full scans hand back an owned cursor so documents can be
//!    streamed to the socket as they are produced.
//! 4. **Typed Failures**: Every backend failure maps onto a `BridgeError` code
//!    instead of being logged and dropped.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use docbridge_common::{BridgeError, Document, DocumentId};

use crate::file::FileStore;
use crate::memory::MemoryStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Lazy, finite, forward-only iterator over a collection.
pub type DocumentCursor = Box<dyn Iterator<Item = StoreResult<Document>> + Send>;

/// Store handle shared by every connection task.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Default database name.
pub const DEFAULT_DATABASE: &str = "my_database";

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "my_collection";

/// Errors reported by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Local I/O failed (file backend).
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A persisted document could not be decoded.
    #[error("corrupt document at line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    /// The document cannot be represented by the backend.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    /// The handle was already disconnected.
    #[error("store is disconnected")]
    Disconnected,
    /// The requested backend or document shape is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<&StoreError> for BridgeError {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => BridgeError::StoreUnavailable,
            StoreError::Disconnected => BridgeError::Disconnected,
            StoreError::InvalidDocument(_) => BridgeError::MalformedDocument,
            StoreError::Io(_) | StoreError::Corrupt { .. } | StoreError::Backend(_) => {
                BridgeError::StoreFailure
            }
            StoreError::Unsupported(_) => BridgeError::InternalError,
        }
    }
}

/// Strategy pattern: defines the store behavior surface for the server.
///
/// All methods block; async callers should run them on a blocking pool.
pub trait DocumentStore: Send + Sync {
    /// Inserts one document and returns its identity.
    ///
    /// Backends assign an `_id` when the document does not carry one.
    fn insert_one(&self, document: Document) -> StoreResult<DocumentId>;

    /// Opens a cursor over the whole collection in insertion order.
    ///
    /// The cursor reflects the collection as of the moment it was opened.
    fn scan_all(&self) -> StoreResult<DocumentCursor>;

    /// Releases the handle. A second call returns `Disconnected`.
    fn disconnect(&self) -> StoreResult<()>;

    /// Human-readable address of the collection, for logs.
    fn describe(&self) -> String;
}

/// Which backend to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store, lost on exit.
    Memory,
    /// Append-only JSON-lines files under a root directory.
    File { root: PathBuf },
    /// MongoDB deployment addressed by a connection string.
    Mongo { uri: String },
}

impl FromStr for StoreBackend {
    type Err = StoreError;

    /// Parses `memory`, `file:<dir>` or a `mongodb://` / `mongodb+srv://` URI.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("memory") {
            return Ok(StoreBackend::Memory);
        }
        if let Some(root) = raw.strip_prefix("file:") {
            if root.is_empty() {
                return Err(StoreError::Unsupported("file backend needs a directory".into()));
            }
            return Ok(StoreBackend::File { root: PathBuf::from(root) });
        }
        if raw.starts_with("mongodb://") || raw.starts_with("mongodb+srv://") {
            return Ok(StoreBackend::Mongo { uri: raw.to_string() });
        }
        Err(StoreError::Unsupported(format!("unknown store backend `{raw}`")))
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("memory"),
            StoreBackend::File { root } => write!(f, "file:{}", root.display()),
            StoreBackend::Mongo { uri } => f.write_str(uri),
        }
    }
}

/// Address of the one collection the server bridges to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database: String,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::Memory,
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

/// Establishes a store handle for the configured collection.
///
/// Failure is meant to abort startup; there is no retry.
pub fn connect(config: &StoreConfig) -> StoreResult<SharedStore> {
    let store: SharedStore = match &config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(&config.database, &config.collection)),
        StoreBackend::File { root } => {
            Arc::new(FileStore::open(root, &config.database, &config.collection)?)
        }
        #[cfg(feature = "mongodb")]
        StoreBackend::Mongo { uri } => Arc::new(crate::mongo::MongoStore::connect(
            uri,
            &config.database,
            &config.collection,
        )?),
        #[cfg(not(feature = "mongodb"))]
        StoreBackend::Mongo { .. } => {
            return Err(StoreError::Unsupported(
                "built without the `mongodb` feature".to_string(),
            ));
        }
    };
    tracing::info!(store = %store.describe(), "store connected");
    Ok(store)
}
