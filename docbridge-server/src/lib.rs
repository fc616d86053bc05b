//! # DocBridge Server
//!
//! Bridge minimal HTTP/1.x requests onto a document store: `POST` inserts the
//! body as one JSON document, `GET` streams the whole collection as
//! newline-delimited JSON.

pub mod config;
pub mod metrics;
pub mod protocol;
pub mod response;
pub mod server;

pub use config::Config;
pub use server::{Server, ServerSettings};
