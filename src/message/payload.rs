//! Payload - values handed to producers, encoded to wire bytes.

use crate::{ClientError, ClientResult};
use serde::Serialize;
use serde_json::Value;

/// A value to be produced to a topic
///
/// Byte payloads pass through unchanged, text is UTF-8 encoded, and JSON
/// values are serialized then UTF-8 encoded. Arbitrary `Serialize` types go
/// through [`Payload::serialize`], which fails with `UnsupportedPayload`
/// rather than silently dropping the value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes, passed through unchanged
    Bytes(Vec<u8>),
    /// Text, UTF-8 encoded on the wire
    Text(String),
    /// Structured value, JSON-serialized then UTF-8 encoded
    Json(Value),
}

impl Payload {
    /// Build a payload from any JSON-serializable value
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UnsupportedPayload` when the value cannot be
    /// represented as JSON (e.g. a map with non-string keys, or a custom
    /// `Serialize` impl that fails).
    pub fn serialize<T: Serialize>(value: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(value).map_err(|e| {
            ClientError::unsupported_payload(format!("value is not JSON-serializable: {}", e))
        })?;
        Ok(Payload::Json(value))
    }

    /// Encode the payload into wire bytes
    pub fn encode(&self) -> ClientResult<Vec<u8>> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::Text(text) => Ok(text.clone().into_bytes()),
            Payload::Json(value) => serde_json::to_vec(value).map_err(|e| {
                ClientError::unsupported_payload(format!("JSON encoding failed: {}", e))
            }),
        }
    }

    /// Short tag for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Text(_) => "text",
            Payload::Json(_) => "json",
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}
