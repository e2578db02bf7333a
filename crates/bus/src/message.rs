use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single pub/sub message: a routing topic plus a raw payload.
///
/// Payloads are carried as-is on the wire so that microcontroller endpoints
/// can speak plain JSON (or bare identifiers) without an envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Routing topic used for subscriber prefix filtering (e.g. "3105/comando").
    pub topic: String,

    /// Raw payload bytes, normally UTF-8 JSON.
    pub payload: Vec<u8>,

    /// When this message was created (sender side) or received (subscriber side).
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message from raw payload bytes.
    pub fn raw(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a message, serializing the payload as compact JSON.
    pub fn json<T: Serialize>(topic: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::raw(topic, serde_json::to_vec(payload)?))
    }

    /// Deserialize the JSON payload into the expected type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// The payload as text.
    pub fn payload_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }
}
