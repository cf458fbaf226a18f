//! RealtimeClient - the main interface for cement.
//!
//! This module provides [`RealtimeClient`], the primary API for applications
//! that keep a local record cache in sync with a realtime service.
//!
//! # Architecture
//!
//! RealtimeClient wires the connection manager, the subscription registry
//! and the dispatcher to one transport and one host.
//!
//! ```text
//! Host ──track()──► SubscriptionRegistry ──subscribe──► ConnectionManager ──► Transport
//!  ▲                      ▲ replay on Connected               │
//!  │                      └──────── ConnectionEvent ──────────┤
//!  └── on_updated / on_deleted ◄── Dispatcher ◄── pushes ──────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cement_client::{ClientConfig, MockTransport, RealtimeClient};
//!
//! let transport = MockTransport::new();
//! let client = RealtimeClient::new(ClientConfig::default(), transport, host)?;
//!
//! // Recorded now, subscribed once the handshake is accepted
//! client.track("article", "1").await?;
//! ```

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;

use cement_core::{ConnectionEvent, ConnectionState, PendingError, TypeBindings};
use cement_types::{CorrelationId, ResourceRef, WireError};

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::dispatch::Dispatcher;
use crate::host::SyncHost;
use crate::registry::{ReplayReport, SubscriptionRegistry, TrackOutcome};
use crate::transport::{Transport, TransportError, TransportState};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Too many requests awaiting replies.
    #[error("pending table: {0}")]
    Pending(#[from] PendingError),

    /// Service answered the handshake with `CONNECTION_DISALLOWED`.
    #[error("handshake disallowed by service")]
    HandshakeDisallowed,

    /// No handshake answer in time, or the service answered `CONNECTION_TIMEOUT`.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Host could not produce the connection message.
    #[error("connection message unavailable: {0}")]
    ConnectionMessage(String),

    /// Service answered a request with a non-success status.
    #[error("request rejected with status {status}: {detail}")]
    Rejected {
        /// Status code from the reply.
        status: i64,
        /// Remaining reply fields.
        detail: Value,
    },

    /// Connection dropped before the reply arrived.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Reply carried an id nothing was waiting for.
    #[error("no pending request for reply {0}")]
    CorrelationMismatch(CorrelationId),

    /// Host has no local name for a wire type.
    #[error("unresolved type: {0}")]
    UnresolvedType(String),

    /// Push for a type that was never tracked.
    #[error("type was never tracked: {0}")]
    UnboundType(String),

    /// Inbound channel closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Realtime sync client over a transport `T`.
pub struct RealtimeClient<T: Transport + 'static> {
    transport: Arc<T>,
    connection: Arc<ConnectionManager>,
    registry: Arc<SubscriptionRegistry>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: Transport + 'static> RealtimeClient<T> {
    /// Create a client and start its background tasks.
    ///
    /// Opens the named channels on `transport` and starts listening for
    /// lifecycle events. If the transport is already open the handshake
    /// starts right away. Must be called within a tokio runtime.
    pub fn new(config: ClientConfig, transport: T, host: Arc<dyn SyncHost>) -> Result<Self, ClientError> {
        let transport = Arc::new(transport);
        let shared: Arc<dyn Transport> = transport.clone();

        let (connection, streams) = ConnectionManager::open(shared, host.clone(), &config)?;
        let bindings = Arc::new(RwLock::new(TypeBindings::new()));
        let registry = Arc::new(SubscriptionRegistry::new(
            connection.clone(),
            host.clone(),
            bindings.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(host, bindings, config.strict_type_bindings));

        // Registry listens before the event loop can emit Connected
        let mut tasks = vec![registry.spawn_replay_listener()];
        tasks.push(tokio::spawn(dispatcher.run(streams.updated, streams.deleted)));
        tasks.extend(connection.start(streams.subscribe));

        tracing::info!(url = %config.url, "Realtime client started");

        Ok(Self {
            transport,
            connection,
            registry,
            tasks,
        })
    }

    /// Start tracking a remote resource.
    ///
    /// Idempotent. Sends a subscribe immediately if connected; otherwise it
    /// is sent after the next accepted handshake.
    pub async fn track(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<TrackOutcome, ClientError> {
        self.registry.track(resource_type, resource_id).await
    }

    /// Send the subscribe for a pair again on the current connection.
    ///
    /// Retries a subscribe that was rejected or failed; see
    /// [`SubscriptionRegistry::resubscribe`].
    pub async fn resubscribe(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<TrackOutcome, ClientError> {
        self.registry.resubscribe(resource_type, resource_id).await
    }

    /// Track an entity the host loaded, subject to [`SyncHost::should_track`].
    pub async fn observe(&self, resource: &ResourceRef) -> Result<Option<TrackOutcome>, ClientError> {
        self.registry.observe(resource).await
    }

    /// Every tracked pair.
    pub async fn tracked(&self) -> Vec<ResourceRef> {
        self.registry.tracked().await
    }

    /// Replay subscriptions for the current connection by hand.
    ///
    /// Replay also runs automatically after each accepted handshake; pairs
    /// already subscribed on this connection are skipped, so this retries
    /// only the ones whose subscribe failed.
    pub async fn replay(&self) -> Option<ReplayReport> {
        let epoch = self.connection.connected_epoch()?;
        Some(self.registry.replay(epoch).await)
    }

    /// Whether the handshake has been accepted on the current connection.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Logical connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Raw transport status, for diagnostics.
    pub fn transport_state(&self) -> TransportState {
        self.connection.transport_state()
    }

    /// Observe connection events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.events()
    }

    /// Watch the logical connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// Replies that matched no pending request since startup.
    pub fn correlation_mismatches(&self) -> u64 {
        self.connection.subscribe_channel().mismatch_count()
    }

    /// Subscribe requests awaiting a reply.
    pub async fn pending_requests(&self) -> usize {
        self.connection.subscribe_channel().pending_count().await
    }

    /// The transport this client runs on.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Stop background tasks and fail outstanding requests.
    pub async fn shutdown(mut self) {
        self.connection.shutdown().await;
        self.abort_tasks();
        tracing::info!("Realtime client stopped");
    }

    fn abort_tasks(&mut self) {
        self.connection.cancel_handshake();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<T: Transport + 'static> Drop for RealtimeClient<T> {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;
    use crate::transport::MockTransport;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Host;

    #[async_trait]
    impl SyncHost for Host {
        async fn connection_message(&self) -> Result<String, HostError> {
            Ok("hello".into())
        }
        fn resolve_local_name(&self, wire_type: &str) -> Option<String> {
            Some(wire_type.to_string())
        }
        fn on_updated(&self, _: &str, _: &str, _: Value) {}
        fn on_deleted(&self, _: &str, _: &str) {}
    }

    fn client() -> (MockTransport, RealtimeClient<MockTransport>) {
        let transport = MockTransport::new();
        let client =
            RealtimeClient::new(ClientConfig::default(), transport.clone(), Arc::new(Host)).unwrap();
        (transport, client)
    }

    // ===========================================
    // Construction Tests
    // ===========================================

    #[tokio::test]
    async fn new_client_is_disconnected() {
        let (transport, client) = client();

        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.transport_state(), TransportState::Closed);
        assert_eq!(transport.open_calls().len(), 4);
        assert_eq!(client.pending_requests().await, 0);
        assert_eq!(client.correlation_mismatches(), 0);
    }

    #[tokio::test]
    async fn replay_without_connection_is_none() {
        let (_transport, client) = client();
        client.track("article", "1").await.unwrap();

        assert!(client.replay().await.is_none());
        assert_eq!(client.tracked().await, vec![ResourceRef::new("article", "1")]);
    }

    #[tokio::test]
    async fn connect_and_accept() {
        let (transport, client) = client();
        let mut events = client.events();

        transport.connect();
        transport.wait_for_sent("connection", 1).await;
        transport.push_inbound("connection", "CONNECTION_ACCEPTED");

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, ConnectionEvent::Connected { epoch: 1 });
        assert!(client.is_connected());
        assert_eq!(client.transport().sent_on("connection"), vec!["hello"]);
    }

    #[tokio::test]
    async fn shutdown_stops_handshake() {
        let (transport, client) = client();
        transport.connect();
        transport.wait_for_sent("connection", 1).await;

        client.shutdown().await;

        // The answer arrives after shutdown and changes nothing
        transport.push_inbound("connection", "CONNECTION_ACCEPTED");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.recycles().is_empty());
    }

    // ===========================================
    // Error Display Tests
    // ===========================================

    #[test]
    fn error_messages() {
        assert_eq!(
            ClientError::HandshakeDisallowed.to_string(),
            "handshake disallowed by service"
        );
        assert_eq!(ClientError::HandshakeTimeout.to_string(), "handshake timed out");
        assert_eq!(
            ClientError::UnresolvedType("article".into()).to_string(),
            "unresolved type: article"
        );
        assert_eq!(
            ClientError::from(TransportError::NotConnected).to_string(),
            "transport error: not connected"
        );
    }
}
