// docbridge-common - Shared types and wire vocabulary for DocBridge
//
// This crate defines the error codes, the document type and the request/status
// vocabulary shared by the store and server crates.

pub mod document;
pub mod error;
pub mod protocol;

// Re-export for convenience
pub use document::*;
pub use error::*;
pub use protocol::*;
