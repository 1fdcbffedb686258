//! Message codecs.
//!
//! A codec turns a [`Message`] into the bytes stored inside an envelope and
//! back. The default [`JsonCodec`] passes text and binary payloads through
//! untouched and encodes structured values as JSON.

use crate::domain::message::{Message, PayloadShape};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use thiserror::Error;

/// Errors raised by a codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be encoded
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// The bytes could not be decoded into the requested shape
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

/// Encodes and decodes message payloads.
pub trait MessageCodec: Send + Sync + Debug {
    /// Encode a message payload.
    ///
    /// # Errors
    /// Returns [`CodecError::Serialization`] for a null payload or a value the
    /// codec cannot represent.
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into a payload of the requested shape.
    ///
    /// # Errors
    /// Returns [`CodecError::Deserialization`] for empty input or input that
    /// does not fit `shape`.
    fn deserialize(&self, data: &[u8], shape: PayloadShape) -> Result<Message, CodecError>;

    /// MIME type recorded in each envelope's `content-type` header.
    fn content_type(&self) -> &str;
}

impl dyn MessageCodec + '_ {
    /// Decode bytes straight into a typed value.
    ///
    /// # Errors
    /// Returns [`CodecError::Deserialization`] if the bytes do not decode into `T`.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        match self.deserialize(data, PayloadShape::Structured)? {
            Message::Structured(value) => serde_json::from_value(value)
                .map_err(|e| CodecError::Deserialization(e.to_string())),
            other => Err(CodecError::Deserialization(format!(
                "codec returned {:?} payload for a structured decode",
                other.shape()
            ))),
        }
    }
}

/// JSON codec with text and binary pass-through.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for JsonCodec {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        match message {
            Message::Text(text) => Ok(text.as_bytes().to_vec()),
            Message::Binary(bytes) => Ok(bytes.clone()),
            Message::Structured(_) if message.is_null() => Err(CodecError::Serialization(
                "message cannot be null".to_string(),
            )),
            Message::Structured(value) => {
                serde_json::to_vec(value).map_err(|e| CodecError::Serialization(e.to_string()))
            }
        }
    }

    fn deserialize(&self, data: &[u8], shape: PayloadShape) -> Result<Message, CodecError> {
        if data.is_empty() {
            return Err(CodecError::Deserialization(
                "data cannot be empty".to_string(),
            ));
        }

        match shape {
            PayloadShape::Text => String::from_utf8(data.to_vec())
                .map(Message::Text)
                .map_err(|e| CodecError::Deserialization(e.to_string())),
            PayloadShape::Binary => Ok(Message::Binary(data.to_vec())),
            PayloadShape::Structured => serde_json::from_slice(data)
                .map(Message::Structured)
                .map_err(|e| CodecError::Deserialization(e.to_string())),
        }
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Signup {
        name: String,
        age: u8,
    }

    #[test]
    fn test_text_passes_through() {
        let codec = JsonCodec::new();
        let bytes = codec.serialize(&Message::from("hello world")).unwrap();
        assert_eq!(bytes, b"hello world");
        assert_eq!(codec.content_type(), "application/json");
    }

    #[test]
    fn test_binary_passes_through() {
        let codec = JsonCodec::new();
        let bytes = codec.serialize(&Message::from(vec![0xde, 0xad])).unwrap();
        assert_eq!(bytes, vec![0xde, 0xad]);
    }

    #[test]
    fn test_structured_encodes_json() {
        let codec = JsonCodec::new();
        let bytes = codec
            .serialize(&Message::Structured(json!({"Name": "test"})))
            .unwrap();
        assert_eq!(bytes, br#"{"Name":"test"}"#);
    }

    #[test]
    fn test_null_is_rejected() {
        let codec = JsonCodec::new();
        let err = codec.serialize(&Message::Structured(Value::Null)).unwrap_err();
        assert!(matches!(err, CodecError::Serialization(_)));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let codec = JsonCodec::new();
        for shape in [PayloadShape::Text, PayloadShape::Binary, PayloadShape::Structured] {
            let err = codec.deserialize(&[], shape).unwrap_err();
            assert!(matches!(err, CodecError::Deserialization(_)));
        }
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let codec = JsonCodec::new();
        let err = codec
            .deserialize(b"{not json", PayloadShape::Structured)
            .unwrap_err();
        assert!(matches!(err, CodecError::Deserialization(_)));
    }

    #[test]
    fn test_invalid_utf8_text_is_rejected() {
        let codec = JsonCodec::new();
        let err = codec.deserialize(&[0xff, 0xfe], PayloadShape::Text).unwrap_err();
        assert!(matches!(err, CodecError::Deserialization(_)));
    }

    #[test]
    fn test_round_trip_each_shape() {
        let codec = JsonCodec::new();
        let inputs = [
            Message::from("plain text"),
            Message::from(vec![1u8, 2, 3, 255]),
            Message::Structured(json!({"list": [1, 2, 3], "nested": {"ok": true}})),
        ];

        for input in inputs {
            let bytes = codec.serialize(&input).unwrap();
            let output = codec.deserialize(&bytes, input.shape()).unwrap();
            assert_eq!(output, input);
        }
    }

    #[test]
    fn test_typed_decode() {
        let codec: &dyn MessageCodec = &JsonCodec::new();
        let original = Signup {
            name: "ada".to_string(),
            age: 36,
        };
        let bytes = codec
            .serialize(&Message::structured(&original).unwrap())
            .unwrap();

        let decoded: Signup = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, original);

        let mismatch = codec.decode::<Signup>(br#"{"name": 5}"#);
        assert!(matches!(mismatch, Err(CodecError::Deserialization(_))));
    }
}
