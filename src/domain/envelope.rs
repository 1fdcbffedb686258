//! Message envelopes and per-message metadata.
//!
//! Every message pushed to a queue is wrapped in a [`MessageEnvelope`] and
//! stored as JSON. The field names and encodings (base64 payload, RFC 3339
//! timestamp, TTL in nanoseconds) are shared with other producers writing to
//! the same queues, so consumers can decode envelopes from either side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Header recording which codec produced the payload.
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// Wrapper around a serialized payload, as stored in a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique message identifier
    pub id: String,
    /// Logical queue name (not the resolved store key)
    pub queue: String,
    /// Codec output
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Ordered string headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Submission time
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Queue TTL applied with this message
    #[serde(with = "duration_nanos")]
    pub ttl: Duration,
    /// Delivery attempts so far
    #[serde(rename = "retries", default)]
    pub retry_count: u32,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl MessageEnvelope {
    /// Wrap a payload in a fresh envelope with a new random id.
    pub fn new(
        queue: impl Into<String>,
        payload: Vec<u8>,
        content_type: &str,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(CONTENT_TYPE_HEADER.to_string(), content_type.to_string());

        Self {
            id: Uuid::new_v4().to_string(),
            queue: queue.into(),
            payload,
            headers,
            created_at,
            ttl,
            retry_count: 0,
            metadata: BTreeMap::new(),
        }
    }

    /// Encode the envelope for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode an envelope read from a queue.
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Metadata describing this envelope, handed to success observers.
    pub fn metadata_at(&self, position: usize) -> MessageMetadata {
        MessageMetadata {
            queue: self.queue.clone(),
            position,
            message_id: self.id.clone(),
            headers: self.headers.clone(),
            timestamp: self.created_at,
            ttl: self.ttl,
            size: self.payload.len(),
        }
    }
}

/// Description of a message that was written to a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageMetadata {
    /// Logical queue name
    pub queue: String,
    /// Index of the message within the call that submitted it
    pub position: usize,
    /// Id of the envelope written to the queue
    pub message_id: String,
    /// Envelope headers
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Submission time
    pub timestamp: DateTime<Utc>,
    /// Queue TTL applied
    pub ttl: Duration,
    /// Serialized payload size in bytes
    pub size: usize,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(deserializer)?))
    }
}
