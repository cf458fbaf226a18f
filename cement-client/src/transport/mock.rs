//! Mock transport for testing.
//!
//! Captures frames sent per channel, lets tests inject inbound frames and
//! drive lifecycle events by hand.

use super::{Transport, TransportError, TransportEvent, TransportState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};

/// How long `wait_for_sent` waits before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the client owns
/// another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    events: broadcast::Sender<TransportEvent>,
    activity: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    state: TransportState,
    channels: HashMap<String, mpsc::UnboundedSender<String>>,
    open_calls: Vec<String>,
    sent: Vec<(String, String)>,
    fail_next_send: Option<String>,
    recycles: Vec<String>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a new, closed mock transport.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
            events,
            activity: Arc::new(Notify::new()),
        }
    }

    /// Open the physical connection and emit `Connected`.
    pub fn connect(&self) {
        self.inner.lock().unwrap().state = TransportState::Open;
        let _ = self.events.send(TransportEvent::Connected);
    }

    /// Close the physical connection and emit `Disconnected`.
    pub fn disconnect(&self, reason: &str) {
        self.inner.lock().unwrap().state = TransportState::Reconnecting;
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Emit a socket-level error without changing state.
    pub fn error(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error {
            message: message.to_string(),
        });
    }

    /// Deliver an inbound frame on a channel.
    ///
    /// Returns `false` if the channel was never opened.
    pub fn push_inbound(&self, channel: &str, frame: impl Into<String>) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.channels.get(channel) {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Frames sent on one channel, in order.
    pub fn sent_on(&self, channel: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .sent
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// Every frame sent, as (channel, frame) pairs.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Wait until at least `count` frames were sent on `channel`.
    ///
    /// Returns whatever was sent once the count is reached or the wait
    /// times out.
    pub async fn wait_for_sent(&self, channel: &str, count: usize) -> Vec<String> {
        let _ = tokio::time::timeout(WAIT_TIMEOUT, async {
            loop {
                let notified = self.activity.notified();
                if self.sent_on(channel).len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.sent_on(channel)
    }

    /// Wait until `recycle` was called at least `count` times.
    pub async fn wait_for_recycles(&self, count: usize) -> Vec<String> {
        let _ = tokio::time::timeout(WAIT_TIMEOUT, async {
            loop {
                let notified = self.activity.notified();
                if self.recycles().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.recycles()
    }

    /// Names passed to `open_channel`, including rejected repeats.
    pub fn open_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().open_calls.clone()
    }

    /// Reasons passed to `recycle`.
    pub fn recycles(&self) -> Vec<String> {
        self.inner.lock().unwrap().recycles.clone()
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_send = Some(error.to_string());
    }

    /// Force the reported state.
    pub fn set_state(&self, state: TransportState) {
        self.inner.lock().unwrap().state = state;
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn open_channel(&self, name: &str) -> Result<mpsc::UnboundedReceiver<String>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.open_calls.push(name.to_string());

        if inner.channels.contains_key(name) {
            return Err(TransportError::ChannelExists(name.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.channels.insert(name.to_string(), tx);
        Ok(rx)
    }

    async fn send(&self, channel: &str, frame: String) -> Result<(), TransportError> {
        {
            let mut inner = self.inner.lock().unwrap();

            if inner.state != TransportState::Open {
                return Err(TransportError::NotConnected);
            }
            if !inner.channels.contains_key(channel) {
                return Err(TransportError::UnknownChannel(channel.to_string()));
            }

            // Check for forced failure
            if let Some(error) = inner.fail_next_send.take() {
                return Err(TransportError::SendFailed(error));
            }

            inner.sent.push((channel.to_string(), frame));
        }
        self.activity.notify_waiters();
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn state(&self) -> TransportState {
        self.inner.lock().unwrap().state
    }

    async fn recycle(&self, reason: &str) -> Result<(), TransportError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.recycles.push(reason.to_string());
            inner.state = TransportState::Reconnecting;
        }
        self.activity.notify_waiters();
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
        Ok(())
    }
}
