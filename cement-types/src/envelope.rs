//! Envelope and Reply - the frames of a correlated channel.
//!
//! A request travels as an [`Envelope`] carrying a fresh correlation id and
//! an already-encoded payload. The service answers with a [`Reply`] echoing
//! the id plus a status code and any detail fields it chooses to add.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CorrelationId, WireError};

/// Status code of a successful reply.
pub const STATUS_OK: i64 = 0;

/// Outbound request frame: `{id, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id, echoed back by the reply.
    pub id: CorrelationId,
    /// Encoded request payload (a JSON document in string form).
    pub data: String,
}

impl Envelope {
    /// Wrap a payload under a fresh correlation id.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: CorrelationId::new(),
            data: data.into(),
        }
    }

    /// Encode as a JSON frame.
    pub fn to_frame(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Decode from a JSON frame.
    pub fn from_frame(frame: &str) -> Result<Self, WireError> {
        serde_json::from_str(frame).map_err(WireError::Deserialization)
    }
}

/// Inbound reply frame: `{id, status, ...detail}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Correlation id of the request being answered.
    pub id: CorrelationId,
    /// `0` on success, anything else is a failure.
    pub status: i64,
    /// Remaining, implementation-defined fields.
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl Reply {
    /// Build a successful reply (used by tests and mock services).
    pub fn ok(id: CorrelationId) -> Self {
        Self {
            id,
            status: STATUS_OK,
            detail: Map::new(),
        }
    }

    /// Build a failed reply with a status and a single `error` field.
    pub fn failed(id: CorrelationId, status: i64, error: &str) -> Self {
        let mut detail = Map::new();
        detail.insert("error".into(), Value::String(error.into()));
        Self { id, status, detail }
    }

    /// Whether the status signals success.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Encode as a JSON frame.
    pub fn to_frame(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Decode from a JSON frame.
    pub fn from_frame(frame: &str) -> Result<Self, WireError> {
        serde_json::from_str(frame).map_err(WireError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let envelope = Envelope::new(r#"{"model":"article","id":"1"}"#);
        let frame = envelope.to_frame().unwrap();
        let raw: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(raw["id"], Value::String(envelope.id.to_string()));
        assert_eq!(raw["data"], r#"{"model":"article","id":"1"}"#);
        assert_eq!(Envelope::from_frame(&frame).unwrap(), envelope);
    }

    #[test]
    fn envelopes_get_distinct_ids() {
        let a = Envelope::new("x");
        let b = Envelope::new("x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn reply_keeps_extra_fields_as_detail() {
        let id = CorrelationId::new();
        let frame = format!(r#"{{"id":"{}","status":3,"error":"forbidden","code":403}}"#, id);
        let reply = Reply::from_frame(&frame).unwrap();

        assert_eq!(reply.id, id);
        assert_eq!(reply.status, 3);
        assert!(!reply.is_success());
        assert_eq!(reply.detail["error"], "forbidden");
        assert_eq!(reply.detail["code"], 403);
    }

    #[test]
    fn reply_status_zero_is_success() {
        let reply = Reply::ok(CorrelationId::new());
        let decoded = Reply::from_frame(&reply.to_frame().unwrap()).unwrap();
        assert!(decoded.is_success());
        assert!(decoded.detail.is_empty());
    }

    #[test]
    fn reply_without_id_is_rejected() {
        let result = Reply::from_frame(r#"{"status":0}"#);
        assert!(matches!(result, Err(WireError::Deserialization(_))));
    }

    #[test]
    fn reply_without_status_is_rejected() {
        let frame = format!(r#"{{"id":"{}"}}"#, CorrelationId::new());
        assert!(Reply::from_frame(&frame).is_err());
    }
}
