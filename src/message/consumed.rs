//! ConsumedMessage - records handed back from `poll`.

use crate::ClientResult;
use serde::Serialize;

/// A single record received from the broker
///
/// Serializes to `{partition, offset, value}`; callers preferring positional
/// access use [`ConsumedMessage::into_tuple`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumedMessage {
    /// Partition the record was read from
    pub partition: i32,
    /// Partition-local offset of the record
    pub offset: i64,
    /// Raw payload bytes
    pub value: Vec<u8>,
}

impl ConsumedMessage {
    /// Create a new consumed message
    pub fn new(partition: i32, offset: i64, value: Vec<u8>) -> Self {
        Self {
            partition,
            offset,
            value,
        }
    }

    /// Positional `(partition, offset, value)` view
    pub fn into_tuple(self) -> (i32, i64, Vec<u8>) {
        (self.partition, self.offset, self.value)
    }

    /// Payload as UTF-8 text, lossy on invalid sequences
    pub fn value_utf8_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    /// Run the payload through an external decoding helper, keeping
    /// partition and offset intact
    pub fn decode_with<F>(self, decoder: F) -> ClientResult<Self>
    where
        F: FnOnce(&[u8]) -> ClientResult<Vec<u8>>,
    {
        let decoded = decoder(&self.value)?;
        Ok(Self {
            partition: self.partition,
            offset: self.offset,
            value: decoded,
        })
    }
}
