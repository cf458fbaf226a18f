//! Channel payloads for cement.
//!
//! These are the documents carried inside [`crate::Envelope`] data or sent
//! directly on the push channels.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::string_or_number;
use crate::WireError;

/// Subscribe request payload: `{model, id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Wire-level type name
    pub model: String,
    /// Resource identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

impl SubscribeRequest {
    /// Create a new subscribe request.
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Encode as the string carried in an envelope's `data` field.
    pub fn to_payload(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Decode from an envelope's `data` field.
    pub fn from_payload(data: &str) -> Result<Self, WireError> {
        serde_json::from_str(data).map_err(WireError::Deserialization)
    }
}

/// Update push: `{model, id, payload}` where `payload` is itself an
/// encoded JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePush {
    /// Wire-level type name
    pub model: String,
    /// Resource identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Nested encoded document
    pub payload: String,
}

impl UpdatePush {
    /// Decode from a push frame.
    pub fn from_frame(frame: &str) -> Result<Self, WireError> {
        serde_json::from_str(frame).map_err(WireError::Deserialization)
    }

    /// Encode as a push frame.
    pub fn to_frame(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Decode the nested document.
    pub fn decode_payload(&self) -> Result<Value, WireError> {
        serde_json::from_str(&self.payload).map_err(|source| WireError::InvalidPayload {
            model: self.model.clone(),
            id: self.id.clone(),
            source,
        })
    }
}

/// Delete push: `{model, id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePush {
    /// Wire-level type name
    pub model: String,
    /// Resource identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

impl DeletePush {
    /// Decode from a push frame.
    pub fn from_frame(frame: &str) -> Result<Self, WireError> {
        serde_json::from_str(frame).map_err(WireError::Deserialization)
    }

    /// Encode as a push frame.
    pub fn to_frame(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }
}

/// Reply to the connection message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeReply {
    /// The service accepted the connection.
    Accepted,
    /// The service refused the connection message.
    Disallowed,
    /// The service gave up waiting for the connection message.
    Timeout,
}

impl HandshakeReply {
    /// Wire sentinel for this reply.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "CONNECTION_ACCEPTED",
            Self::Disallowed => "CONNECTION_DISALLOWED",
            Self::Timeout => "CONNECTION_TIMEOUT",
        }
    }

    /// Decode a sentinel frame.
    ///
    /// Accepts the bare sentinel as well as its JSON string encoding.
    pub fn from_frame(frame: &str) -> Result<Self, WireError> {
        let trimmed = frame.trim();
        let sentinel = serde_json::from_str::<String>(trimmed)
            .unwrap_or_else(|_| trimmed.to_string());

        match sentinel.as_str() {
            "CONNECTION_ACCEPTED" => Ok(Self::Accepted),
            "CONNECTION_DISALLOWED" => Ok(Self::Disallowed),
            "CONNECTION_TIMEOUT" => Ok(Self::Timeout),
            _ => Err(WireError::UnknownHandshakeReply(sentinel)),
        }
    }
}
