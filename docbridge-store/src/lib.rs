
pub mod file;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;
pub use store::{
    connect, DocumentCursor, DocumentStore, SharedStore, StoreBackend, StoreConfig, StoreError,
    StoreResult,
};
