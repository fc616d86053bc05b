//! # Response Encoder
//!
//! Builds the two success shapes and the JSON error shape. Success responses
//! are fixed byte strings; scan bodies are appended line by line so the
//! handler can flush whenever its buffer grows past a threshold.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::json;

use docbridge_common::{ALLOWED_METHODS, BridgeError, Document, JSON_CONTENT_TYPE};

/// Reply to a successful write: no body.
pub const WRITE_OK: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";

/// Head of a successful read; the body is delimited by connection close.
pub const SCAN_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n";

/// Appends one document as a JSON line.
pub fn encode_document_line(document: &Document, out: &mut BytesMut) {
    // Writing a JSON map into a growable buffer cannot fail.
    let _ = serde_json::to_writer((&mut *out).writer(), document.fields());
    out.put_u8(b'\n');
}

/// Builds a complete error response for `error` with a human-readable detail.
pub fn encode_error(error: BridgeError, detail: &str) -> Bytes {
    let status = error.status();
    let body = json!({
        "error": error.to_string(),
        "code": error.code(),
        "message": detail,
    })
    .to_string();

    let mut out = BytesMut::with_capacity(128 + body.len());
    out.put_slice(status.status_line().as_bytes());
    out.put_slice(b"\r\nContent-Type: ");
    out.put_slice(JSON_CONTENT_TYPE.as_bytes());
    out.put_slice(format!("\r\nContent-Length: {}\r\n", body.len()).as_bytes());
    if error == BridgeError::UnsupportedMethod {
        out.put_slice(format!("Allow: {ALLOWED_METHODS}\r\n").as_bytes());
    }
    out.put_slice(b"\r\n");
    out.put_slice(body.as_bytes());
    out.freeze()
}
