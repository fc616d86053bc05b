//! # Document Type
//!
//! A document is a JSON object with no further schema. Identity lives under
//! [`ID_FIELD`] and is assigned by the store when the caller leaves it out.

use core::fmt;

use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};

/// Field holding the store-assigned identity.
pub const ID_FIELD: &str = "_id";

/// Identity reported by a store after an insert.
pub type DocumentId = String;

/// A single JSON object stored in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Parses a request body into a document.
    ///
    /// Fails with `MalformedDocument` for invalid JSON and for any value that
    /// is not an object.
    pub fn from_json_bytes(bytes: &[u8]) -> BridgeResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|_| BridgeError::MalformedDocument)?;
        Self::from_value(value)
    }

    /// Wraps an already parsed JSON value.
    pub fn from_value(value: Value) -> BridgeResult<Self> {
        match value {
            Value::Object(fields) => Ok(Document { fields }),
            _ => Err(BridgeError::MalformedDocument),
        }
    }

    /// Returns the identity field, if present.
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID_FIELD)
    }

    /// Sets the identity field unless one is already present, and returns the
    /// identity as a string.
    pub fn ensure_id(&mut self, generate: impl FnOnce() -> DocumentId) -> DocumentId {
        match self.fields.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => {
                let id = generate();
                self.fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        }
    }

    /// Returns the underlying fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns a copy of the document without its identity field.
    pub fn without_id(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.remove(ID_FIELD);
        Value::Object(fields)
    }

    /// Consumes the document and returns it as a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Appends the compact JSON text of the document to `out`.
    pub fn write_json(&self, out: &mut Vec<u8>) {
        // Serializing a map of JSON values into a Vec cannot fail.
        let _ = serde_json::to_writer(out, &self.fields);
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.write_json(&mut out);
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_object_body() {
        let doc = Document::from_json_bytes(br#"{"name":"a"}"#).unwrap();
        assert_eq!(doc.into_value(), json!({"name": "a"}));
    }

    #[test]
    fn rejects_invalid_json() {
        assert_eq!(
            Document::from_json_bytes(b"not json"),
            Err(BridgeError::MalformedDocument)
        );
        assert_eq!(Document::from_json_bytes(b""), Err(BridgeError::MalformedDocument));
    }

    #[test]
    fn rejects_non_object_values() {
        for body in [&b"[1,2]"[..], b"42", b"\"text\"", b"null", b"true"] {
            assert_eq!(Document::from_json_bytes(body), Err(BridgeError::MalformedDocument));
        }
    }

    #[test]
    fn ensure_id_keeps_caller_identity() {
        let mut doc = Document::from_value(json!({"_id": "mine", "x": 1})).unwrap();
        let id = doc.ensure_id(|| "generated".to_string());
        assert_eq!(id, "mine");
        assert_eq!(doc.id(), Some(&json!("mine")));
    }

    #[test]
    fn ensure_id_assigns_missing_identity() {
        let mut doc = Document::from_value(json!({"x": 1})).unwrap();
        let id = doc.ensure_id(|| "generated".to_string());
        assert_eq!(id, "generated");
        assert_eq!(doc.without_id(), json!({"x": 1}));
    }

    #[test]
    fn writes_compact_json() {
        let doc = Document::from_value(json!({"a": [1, 2]})).unwrap();
        assert_eq!(doc.to_string(), r#"{"a":[1,2]}"#);
    }
}
