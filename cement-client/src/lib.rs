//! # cement-client
//!
//! Client-side realtime sync layer for cement.
//!
//! Keeps a host application's local record cache in sync with a remote
//! service over a multiplexed socket: subscribe to individual records, get
//! pushed updates and deletes, and recover subscriptions after reconnects.
//!
//! ## Features
//!
//! - **Correlated Requests**: every request carries a fresh id; replies are
//!   matched back to exactly one waiter
//! - **Handshake Gating**: the connection counts as up only after the service
//!   accepts the host's connection message
//! - **Subscription Replay**: tracked records are re-subscribed exactly once
//!   per accepted connection
//! - **Transport Abstraction**: pluggable socket layer (mock for testing)
//! - **Pure State Machine**: uses cement-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use cement_client::{ClientConfig, RealtimeClient};
//!
//! let config = ClientConfig::from_file(Path::new("cement.toml"))?;
//! cement_client::logging::init_subscriber(&config.log_level);
//!
//! let client = RealtimeClient::new(config, transport, host)?;
//! client.track("article", "1").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod host;
pub mod logging;
pub mod registry;
pub mod transport;

pub use channel::CorrelatedChannel;
pub use client::{ClientError, RealtimeClient};
pub use config::{ClientConfig, ConfigError, TransportConfig};
pub use connection::{ChannelStreams, ConnectionManager};
pub use dispatch::Dispatcher;
pub use host::{HostError, SyncHost};
pub use registry::{ReplayReport, SubscriptionRegistry, TrackOutcome};
pub use transport::{
    MockTransport, Transport, TransportError, TransportEvent, TransportOptions, TransportState,
};

pub use cement_core::{ConnectionEvent, ConnectionState, ReconnectPolicy};
pub use cement_types::ResourceRef;
