//! ConnectionManager - connection lifecycle and the handshake.
//!
//! The manager owns the transport handle and the four named channels the
//! realtime layer uses. It feeds transport lifecycle events into the pure
//! state machine from cement-core and executes the actions it returns:
//!
//! ```text
//! Transport events ──► ConnectionState::on_event ──► actions
//!                                                     ├─ StartHandshake  → spawn handshake task
//!                                                     ├─ CancelHandshake → abort it
//!                                                     ├─ FailPending     → subscribe channel fail_all
//!                                                     ├─ RecycleTransport→ transport.recycle
//!                                                     └─ EmitEvent       → broadcast to observers
//! ```
//!
//! Channels are opened once in [`ConnectionManager::open`] and reused across
//! every reconnect.

use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use cement_core::{Action, ConnectionEvent, ConnectionState, Event};
use cement_types::{channels, HandshakeReply, Reply, SubscribeRequest};

use crate::channel::CorrelatedChannel;
use crate::client::ClientError;
use crate::config::ClientConfig;
use crate::host::SyncHost;
use crate::transport::{Transport, TransportEvent, TransportState};

/// Capacity of the connection event broadcast.
const EVENT_CAPACITY: usize = 64;

/// Inbound streams handed out by [`ConnectionManager::open`].
pub struct ChannelStreams {
    /// Replies on the subscribe channel; give to [`ConnectionManager::start`].
    pub subscribe: mpsc::UnboundedReceiver<String>,
    /// Update pushes.
    pub updated: mpsc::UnboundedReceiver<String>,
    /// Delete pushes.
    pub deleted: mpsc::UnboundedReceiver<String>,
}

/// Drives the connection state machine over a transport.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    host: Arc<dyn SyncHost>,
    handshake_timeout: Duration,
    subscribe: Arc<CorrelatedChannel>,
    handshake_replies: Mutex<mpsc::UnboundedReceiver<String>>,
    handshake_task: StdMutex<Option<JoinHandle<()>>>,
    state: Mutex<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    next_epoch: AtomicU64,
}

impl ConnectionManager {
    /// Open the subscribe, updated, deleted and handshake channels.
    pub fn open(
        transport: Arc<dyn Transport>,
        host: Arc<dyn SyncHost>,
        config: &ClientConfig,
    ) -> Result<(Arc<Self>, ChannelStreams), ClientError> {
        let streams = ChannelStreams {
            subscribe: transport.open_channel(channels::SUBSCRIBE)?,
            updated: transport.open_channel(channels::UPDATED)?,
            deleted: transport.open_channel(channels::DELETED)?,
        };
        let handshake_replies = transport.open_channel(channels::HANDSHAKE)?;

        let subscribe = Arc::new(CorrelatedChannel::new(
            channels::SUBSCRIBE,
            transport.clone(),
            config.max_pending_requests,
        ));
        let (state_tx, _) = watch::channel(ConnectionState::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let manager = Arc::new(Self {
            transport,
            host,
            handshake_timeout: config.handshake_timeout(),
            subscribe,
            handshake_replies: Mutex::new(handshake_replies),
            handshake_task: StdMutex::new(None),
            state: Mutex::new(ConnectionState::new()),
            state_tx,
            events,
            next_epoch: AtomicU64::new(0),
        });

        Ok((manager, streams))
    }

    /// Spawn the transport event loop and the subscribe reply loop.
    ///
    /// Observers that must not miss the first `Connected` event should call
    /// [`ConnectionManager::events`] before this.
    pub fn start(self: &Arc<Self>, subscribe_replies: mpsc::UnboundedReceiver<String>) -> Vec<JoinHandle<()>> {
        let transport_events = self.transport.events();
        let already_open = self.transport.state() == TransportState::Open;

        let manager = Arc::clone(self);
        let event_loop = tokio::spawn(async move {
            if already_open {
                manager.on_transport_event(TransportEvent::Connected).await;
            }
            manager.run_events(transport_events).await;
        });

        let channel = Arc::clone(&self.subscribe);
        let reply_loop = tokio::spawn(async move { channel.run(subscribe_replies).await });

        vec![event_loop, reply_loop]
    }

    /// Subscribe to a remote resource over the correlated subscribe channel.
    ///
    /// Only meaningful while connected; the caller checks.
    pub async fn subscribe(&self, resource_type: &str, resource_id: &str) -> Result<Reply, ClientError> {
        let payload = SubscribeRequest::new(resource_type, resource_id).to_payload()?;
        self.subscribe.send(&payload).await
    }

    /// Observe connection events. Dropping the receiver unregisters.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Watch the logical connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Logical (handshake-aware) connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Whether the handshake has been accepted on the current connection.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Epoch of the accepted connection, if any.
    pub fn connected_epoch(&self) -> Option<u64> {
        self.state().connected_epoch()
    }

    /// Raw transport status; may be `Open` before the handshake is accepted.
    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    /// The correlated subscribe channel, for diagnostics.
    pub fn subscribe_channel(&self) -> &CorrelatedChannel {
        &self.subscribe
    }

    /// Tear down: cancel the handshake and fail pending requests.
    pub async fn shutdown(self: &Arc<Self>) {
        self.apply(Event::Shutdown).await;
    }

    /// Abort a running handshake task, if any.
    pub fn cancel_handshake(&self) {
        if let Ok(mut slot) = self.handshake_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    async fn run_events(self: &Arc<Self>, mut events: broadcast::Receiver<TransportEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.on_transport_event(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} transport events", skipped);
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Transport event stream closed");
                    break;
                }
            }
        }
    }

    async fn on_transport_event(self: &Arc<Self>, event: TransportEvent) {
        let event = match event {
            TransportEvent::Connected => {
                let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(epoch, "Transport connected");
                Event::TransportConnected { epoch }
            }
            TransportEvent::Disconnected { reason } => {
                tracing::debug!("Transport disconnected: {}", reason);
                Event::TransportDisconnected { reason }
            }
            TransportEvent::Error { message } => {
                tracing::warn!("Transport error: {}", message);
                Event::TransportError { error: message }
            }
        };
        self.apply(event).await;
    }

    /// Run one state machine step and execute the resulting actions.
    async fn apply(self: &Arc<Self>, event: Event) {
        let actions = {
            let mut state = self.state.lock().await;
            let (next, actions) = state.on_event(event);
            if next != *state {
                tracing::info!("Connection {} -> {}", state.as_str(), next.as_str());
            }
            *state = next;
            self.state_tx.send_replace(next);
            actions
        };

        for action in actions {
            self.execute(action).await;
        }
    }

    async fn execute(self: &Arc<Self>, action: Action) {
        match action {
            Action::StartHandshake { epoch } => {
                let task = tokio::spawn(Arc::clone(self).handshake_task(epoch));
                if let Ok(mut slot) = self.handshake_task.lock() {
                    if let Some(previous) = slot.replace(task) {
                        previous.abort();
                    }
                }
            }
            Action::CancelHandshake => self.cancel_handshake(),
            Action::FailPending { reason } => {
                self.subscribe.fail_all(&reason).await;
            }
            Action::RecycleTransport { reason } => {
                if let Err(e) = self.transport.recycle(&reason).await {
                    tracing::warn!("Failed to recycle transport: {}", e);
                }
            }
            Action::EmitEvent(event) => {
                match &event {
                    ConnectionEvent::Connected { epoch } => {
                        tracing::info!(epoch, "Realtime connection accepted");
                    }
                    ConnectionEvent::Disconnected { reason } => {
                        tracing::info!("Realtime connection lost: {}", reason);
                    }
                    ConnectionEvent::HandshakeFailed { error } => {
                        tracing::warn!("Handshake failed: {}", error);
                    }
                    ConnectionEvent::TransportError { .. } => {}
                }
                // No observers is fine
                let _ = self.events.send(event);
            }
        }
    }

    fn handshake_task(self: Arc<Self>, epoch: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let outcome = match tokio::time::timeout(self.handshake_timeout, self.handshake()).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::HandshakeTimeout),
            };
            let event = match outcome {
                Ok(()) => Event::HandshakeAccepted { epoch },
                Err(e) => Event::HandshakeFailed {
                    epoch,
                    error: e.to_string(),
                },
            };
            self.apply(event).await;
        })
    }

    /// Send the connection message and wait for its sentinel reply.
    async fn handshake(&self) -> Result<(), ClientError> {
        let message = self
            .host
            .connection_message()
            .await
            .map_err(|e| ClientError::ConnectionMessage(e.to_string()))?;

        let mut replies = self.handshake_replies.lock().await;
        // Drop late answers to an abandoned earlier attempt
        while replies.try_recv().is_ok() {}

        self.transport.send(channels::HANDSHAKE, message).await?;

        let frame = replies
            .recv()
            .await
            .ok_or_else(|| ClientError::ChannelClosed(channels::HANDSHAKE.to_string()))?;

        match HandshakeReply::from_frame(&frame)? {
            HandshakeReply::Accepted => Ok(()),
            HandshakeReply::Disallowed => Err(ClientError::HandshakeDisallowed),
            HandshakeReply::Timeout => Err(ClientError::HandshakeTimeout),
        }
    }
}
