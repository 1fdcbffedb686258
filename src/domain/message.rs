//! Outbound message payloads.
//!
//! Callers hand the engine a [`Message`], a closed set of payload kinds. The
//! codec decides how each kind becomes bytes on the wire.

use serde::Serialize;
use serde_json::Value;

/// A message payload submitted for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// UTF-8 text, written to the queue unchanged
    Text(String),
    /// Raw bytes, written to the queue unchanged
    Binary(Vec<u8>),
    /// A structured value, encoded by the codec
    Structured(Value),
}

/// The payload kind a caller expects back when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Decode into [`Message::Text`]
    Text,
    /// Decode into [`Message::Binary`]
    Binary,
    /// Decode into [`Message::Structured`]
    Structured,
}

impl Message {
    /// Build a structured message from any serializable value.
    ///
    /// # Errors
    /// Returns the serde error if the value cannot be represented as JSON.
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Message::Structured)
    }

    /// The shape this message would decode back into.
    pub fn shape(&self) -> PayloadShape {
        match self {
            Message::Text(_) => PayloadShape::Text,
            Message::Binary(_) => PayloadShape::Binary,
            Message::Structured(_) => PayloadShape::Structured,
        }
    }

    /// Returns true for a structured null, which no codec accepts.
    pub fn is_null(&self) -> bool {
        matches!(self, Message::Structured(Value::Null))
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_owned())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Message::Binary(bytes)
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Message::Binary(bytes.to_vec())
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Message::Structured(value)
    }
}
