//! Error types for cement wire handling.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Nested payload document could not be decoded
    #[error("invalid payload for {model}/{id}: {source}")]
    InvalidPayload {
        /// Wire-level type name of the pushed resource.
        model: String,
        /// Resource identifier.
        id: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Handshake reply was not one of the known sentinels
    #[error("unknown handshake reply: {0:?}")]
    UnknownHandshakeReply(String),
}
