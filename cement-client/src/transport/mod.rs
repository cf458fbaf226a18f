//! Transport abstraction for cement.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying socket (a multiplexing websocket client, mock for testing).
//!
//! # Design
//!
//! The transport owns the physical connection and its reconnect loop. On top
//! of it, the realtime layer needs only:
//! - `open_channel()` to register a named sub-channel and get its inbound frames
//! - `send()` to transmit a framed string on a named sub-channel
//! - `events()` to observe connect/disconnect/error pushes
//! - `state()` for a coarse, synchronous status query
//! - `recycle()` to drop the current connection after a failed handshake
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! let mut inbound = transport.open_channel("updated")?;
//! transport.send("subscribe", frame).await?;
//! let push = inbound.recv().await;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use cement_core::ReconnectPolicy;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Channel name already registered.
    #[error("channel already open: {0}")]
    ChannelExists(String),

    /// Channel name never registered.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Lifecycle pushes from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Physical connection is open (first connect or a reconnect).
    Connected,
    /// Physical connection closed.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Socket-level failure.
    Error {
        /// Error message describing the failure.
        message: String,
    },
}

/// Coarse transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No connection and no attempt in progress.
    #[default]
    Closed,
    /// First connection attempt in progress.
    Opening,
    /// Physical connection is open.
    Open,
    /// Waiting for or performing a reconnect attempt.
    Reconnecting,
}

impl TransportState {
    /// Status string, as a socket library would report it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options a transport implementation is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Host of the realtime service.
    pub url: String,
    /// Path prefix the socket endpoint is mounted under.
    pub base_path: String,
    /// Give up on a single connect attempt after this long.
    pub connect_timeout: Duration,
    /// Reconnect schedule.
    pub reconnect: ReconnectPolicy,
}

/// Transport trait for the multiplexed realtime socket.
///
/// Implementations handle the underlying connection mechanism, its framing
/// and its reconnect loop.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register a named sub-channel and return its inbound frames.
    ///
    /// Each name may be opened once; the channel survives reconnects.
    fn open_channel(&self, name: &str) -> Result<mpsc::UnboundedReceiver<String>, TransportError>;

    /// Send a frame on a named sub-channel.
    async fn send(&self, channel: &str, frame: String) -> Result<(), TransportError>;

    /// Subscribe to lifecycle events.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;

    /// Current coarse status.
    fn state(&self) -> TransportState;

    /// Drop the current physical connection; the transport reconnects
    /// according to its own policy.
    async fn recycle(&self, reason: &str) -> Result<(), TransportError>;
}
