//! CorrelatedChannel - request/response on top of a bare named channel.
//!
//! Every request is wrapped in an [`Envelope`] under a fresh correlation id
//! and parked in a [`PendingTable`] until a [`Reply`] with the same id
//! arrives on the channel's inbound stream.
//!
//! ```text
//! send(payload) ──► pending[id] = waiter ──► transport.send({id, data})
//!                                                     │
//! waiter ◄── take(pending[id]) ◄── run(): Reply{id, status} ◄──┘
//! ```
//!
//! The inbound loop and concurrent `send` calls share the pending table
//! behind a mutex. A response whose id is not pending is a protocol desync;
//! it is logged and counted, and never touches other waiters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

use cement_core::PendingTable;
use cement_types::{CorrelationId, Envelope, Reply};

use crate::client::ClientError;
use crate::transport::Transport;

type Waiter = oneshot::Sender<Result<Reply, ClientError>>;
type Pending = Arc<Mutex<PendingTable<Waiter>>>;

/// Removes a request from the pending table if its caller stops waiting.
struct PendingGuard {
    pending: Pending,
    id: Option<CorrelationId>,
}

impl PendingGuard {
    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Ok(mut pending) = self.pending.try_lock() {
            pending.take(&id);
            return;
        }
        // Table busy: finish the removal on the runtime
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let pending = Arc::clone(&self.pending);
            runtime.spawn(async move {
                pending.lock().await.take(&id);
            });
        }
    }
}

/// A named channel with request/response correlation.
pub struct CorrelatedChannel {
    name: String,
    transport: Arc<dyn Transport>,
    pending: Pending,
    mismatches: AtomicU64,
}

impl CorrelatedChannel {
    /// Wrap the named channel. The channel must already be open on the
    /// transport; its inbound stream is consumed by [`CorrelatedChannel::run`].
    pub fn new(name: &str, transport: Arc<dyn Transport>, max_pending: usize) -> Self {
        Self {
            name: name.to_string(),
            transport,
            pending: Arc::new(Mutex::new(PendingTable::new(max_pending))),
            mismatches: AtomicU64::new(0),
        }
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a payload and wait for the matching reply.
    ///
    /// Resolves with the reply when its status is 0; any other status is a
    /// [`ClientError::Rejected`]. A transport send failure fails immediately
    /// and nothing is left pending. Dropping the returned future before it
    /// settles also removes the request.
    pub async fn send(&self, payload: &str) -> Result<Reply, ClientError> {
        let envelope = Envelope::new(payload);
        let frame = envelope.to_frame()?;
        let (tx, rx) = oneshot::channel();

        // Register before sending so a fast reply always finds its waiter
        self.pending.lock().await.insert(envelope.id, tx)?;
        let mut guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            id: Some(envelope.id),
        };

        self.transport.send(&self.name, frame).await?;

        tracing::debug!(channel = %self.name, id = %envelope.id, "Request sent");

        let settled = rx.await;
        guard.disarm();
        match settled {
            Ok(result) => result,
            // Waiter dropped without an answer: the table was torn down
            Err(_) => Err(ClientError::ConnectionLost("channel closed".into())),
        }
    }

    /// Settle the pending request a reply frame answers.
    pub async fn handle_frame(&self, frame: &str) -> Result<(), ClientError> {
        let reply = Reply::from_frame(frame)?;

        let Some(waiter) = self.pending.lock().await.take(&reply.id) else {
            self.mismatches.fetch_add(1, Ordering::Relaxed);
            return Err(ClientError::CorrelationMismatch(reply.id));
        };

        let result = if reply.is_success() {
            Ok(reply)
        } else {
            Err(ClientError::Rejected {
                status: reply.status,
                detail: serde_json::Value::Object(reply.detail),
            })
        };

        // Caller may have stopped waiting; nothing to do then
        let _ = waiter.send(result);
        Ok(())
    }

    /// Reject every pending request, e.g. because the connection dropped.
    ///
    /// Returns how many requests were failed.
    pub async fn fail_all(&self, reason: &str) -> usize {
        let drained = self.pending.lock().await.drain();
        let count = drained.len();
        for (_, waiter) in drained {
            let _ = waiter.send(Err(ClientError::ConnectionLost(reason.to_string())));
        }
        if count > 0 {
            tracing::debug!(channel = %self.name, count, "Failed pending requests: {}", reason);
        }
        count
    }

    /// Consume inbound frames until the transport drops the channel.
    pub async fn run(&self, mut inbound: mpsc::UnboundedReceiver<String>) {
        while let Some(frame) = inbound.recv().await {
            if let Err(e) = self.handle_frame(&frame).await {
                tracing::warn!(channel = %self.name, "Correlation anomaly: {}", e);
            }
        }
        self.fail_all("channel closed").await;
    }

    /// Number of requests awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Replies received that matched no pending request.
    pub fn mismatch_count(&self) -> u64 {
        self.mismatches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use cement_types::CorrelationId;
    use std::time::Duration;

    fn setup() -> (MockTransport, Arc<CorrelatedChannel>, mpsc::UnboundedReceiver<String>) {
        let transport = MockTransport::new();
        let inbound = transport.open_channel("subscribe").unwrap();
        transport.connect();
        let channel = Arc::new(CorrelatedChannel::new(
            "subscribe",
            Arc::new(transport.clone()),
            16,
        ));
        (transport, channel, inbound)
    }

    fn sent_id(frame: &str) -> CorrelationId {
        Envelope::from_frame(frame).unwrap().id
    }

    // ===========================================
    // Send / Settle Tests
    // ===========================================

    #[tokio::test]
    async fn send_wraps_payload_in_envelope() {
        let (transport, channel, _inbound) = setup();

        let task = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send(r#"{"model":"article","id":"1"}"#).await }
        });

        let sent = transport.wait_for_sent("subscribe", 1).await;
        let envelope = Envelope::from_frame(&sent[0]).unwrap();
        assert_eq!(envelope.data, r#"{"model":"article","id":"1"}"#);

        channel
            .handle_frame(&Reply::ok(envelope.id).to_frame().unwrap())
            .await
            .unwrap();

        let reply = task.await.unwrap().unwrap();
        assert_eq!(reply.id, envelope.id);
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn nonzero_status_rejects_with_detail() {
        let (transport, channel, _inbound) = setup();

        let task = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("{}").await }
        });

        let sent = transport.wait_for_sent("subscribe", 1).await;
        let id = sent_id(&sent[0]);
        channel
            .handle_frame(&Reply::failed(id, 2, "no such model").to_frame().unwrap())
            .await
            .unwrap();

        match task.await.unwrap() {
            Err(ClientError::Rejected { status, detail }) => {
                assert_eq!(status, 2);
                assert_eq!(detail["error"], "no such model");
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_sends_never_cross_resolve() {
        let (transport, channel, _inbound) = setup();

        let a = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("a").await }
        });
        let b = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("b").await }
        });

        let sent = transport.wait_for_sent("subscribe", 2).await;
        let by_data: std::collections::HashMap<String, CorrelationId> = sent
            .iter()
            .map(|f| {
                let e = Envelope::from_frame(f).unwrap();
                (e.data, e.id)
            })
            .collect();

        // Answer b first, with a failure, then a with success
        channel
            .handle_frame(&Reply::failed(by_data["b"], 1, "nope").to_frame().unwrap())
            .await
            .unwrap();
        channel
            .handle_frame(&Reply::ok(by_data["a"]).to_frame().unwrap())
            .await
            .unwrap();

        assert_eq!(a.await.unwrap().unwrap().id, by_data["a"]);
        assert!(matches!(
            b.await.unwrap(),
            Err(ClientError::Rejected { status: 1, .. })
        ));
    }

    // ===========================================
    // Anomaly Tests
    // ===========================================

    #[tokio::test]
    async fn unknown_reply_id_is_a_mismatch_and_leaves_others_pending() {
        let (transport, channel, _inbound) = setup();

        let task = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("x").await }
        });
        let sent = transport.wait_for_sent("subscribe", 1).await;

        let stray = Reply::ok(CorrelationId::new()).to_frame().unwrap();
        let result = channel.handle_frame(&stray).await;
        assert!(matches!(result, Err(ClientError::CorrelationMismatch(_))));
        assert_eq!(channel.mismatch_count(), 1);
        assert_eq!(channel.pending_count().await, 1);

        channel
            .handle_frame(&Reply::ok(sent_id(&sent[0])).to_frame().unwrap())
            .await
            .unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn duplicate_reply_is_a_mismatch() {
        let (transport, channel, _inbound) = setup();

        let task = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("x").await }
        });
        let sent = transport.wait_for_sent("subscribe", 1).await;
        let reply = Reply::ok(sent_id(&sent[0])).to_frame().unwrap();

        channel.handle_frame(&reply).await.unwrap();
        assert!(channel.handle_frame(&reply).await.is_err());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn garbage_frame_is_a_wire_error() {
        let (_transport, channel, _inbound) = setup();
        let result = channel.handle_frame("not json").await;
        assert!(matches!(result, Err(ClientError::Wire(_))));
    }

    // ===========================================
    // Failure Tests
    // ===========================================

    #[tokio::test]
    async fn transport_send_failure_fails_immediately() {
        let (transport, channel, _inbound) = setup();
        transport.fail_next_send("socket gone");

        let result = channel.send("x").await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn fail_all_rejects_every_pending_request() {
        let (transport, channel, _inbound) = setup();

        let tasks: Vec<_> = (0..3)
            .map(|i| {
                let channel = channel.clone();
                tokio::spawn(async move { channel.send(&i.to_string()).await })
            })
            .collect();
        transport.wait_for_sent("subscribe", 3).await;

        assert_eq!(channel.fail_all("disconnected").await, 3);
        for task in tasks {
            assert!(matches!(
                task.await.unwrap(),
                Err(ClientError::ConnectionLost(_))
            ));
        }
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn full_table_refuses_new_requests() {
        let transport = MockTransport::new();
        let _inbound = transport.open_channel("subscribe").unwrap();
        transport.connect();
        let channel = Arc::new(CorrelatedChannel::new(
            "subscribe",
            Arc::new(transport.clone()),
            1,
        ));

        let _first = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("a").await }
        });
        transport.wait_for_sent("subscribe", 1).await;

        let result = channel.send("b").await;
        assert!(matches!(result, Err(ClientError::Pending(_))));
    }

    #[tokio::test]
    async fn abandoned_send_frees_its_slot() {
        let transport = MockTransport::new();
        let _inbound = transport.open_channel("subscribe").unwrap();
        transport.connect();
        let channel = CorrelatedChannel::new("subscribe", Arc::new(transport.clone()), 1);

        let gave_up = tokio::time::timeout(Duration::from_millis(20), channel.send("a")).await;
        assert!(gave_up.is_err());
        assert_eq!(channel.pending_count().await, 0);

        // The single slot is usable again: the next send waits for a reply
        // instead of failing as full
        let again = tokio::time::timeout(Duration::from_millis(20), channel.send("b")).await;
        assert!(again.is_err());
        assert_eq!(transport.sent_on("subscribe").len(), 2);
        assert_eq!(channel.pending_count().await, 0);
    }

    // ===========================================
    // Inbound Loop Tests
    // ===========================================

    #[tokio::test]
    async fn run_settles_from_inbound_stream() {
        let (transport, channel, inbound) = setup();
        let runner = tokio::spawn({
            let channel = channel.clone();
            async move { channel.run(inbound).await }
        });

        let task = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("x").await }
        });
        let sent = transport.wait_for_sent("subscribe", 1).await;

        // A stray reply first: logged, not fatal
        transport.push_inbound("subscribe", Reply::ok(CorrelationId::new()).to_frame().unwrap());
        transport.push_inbound("subscribe", Reply::ok(sent_id(&sent[0])).to_frame().unwrap());

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(channel.mismatch_count(), 1);
        runner.abort();
    }
}
