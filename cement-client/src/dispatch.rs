//! Dispatcher - routes update and delete pushes to the host.
//!
//! Pushes carry wire-level type names. Before a push reaches the host the
//! wire name is resolved to the host's local name through the shared
//! [`TypeBindings`]. A push whose type cannot be resolved is dropped and
//! surfaced through [`SyncHost::on_dispatch_error`].

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use cement_core::TypeBindings;
use cement_types::{DeletePush, UpdatePush};

use crate::client::ClientError;
use crate::host::SyncHost;

/// Routes inbound pushes to host callbacks.
pub struct Dispatcher {
    host: Arc<dyn SyncHost>,
    bindings: Arc<RwLock<TypeBindings>>,
    strict: bool,
}

impl Dispatcher {
    /// Create a dispatcher.
    ///
    /// With `strict` set, only types bound when tracking are delivered.
    /// Otherwise the host resolver is asked on a miss and the answer is
    /// remembered.
    pub fn new(host: Arc<dyn SyncHost>, bindings: Arc<RwLock<TypeBindings>>, strict: bool) -> Self {
        Self {
            host,
            bindings,
            strict,
        }
    }

    /// Deliver one frame from the updated channel.
    pub async fn on_updated(&self, frame: &str) -> Result<(), ClientError> {
        let push = UpdatePush::from_frame(frame)?;
        let local = self.local_name(&push.model).await?;
        let payload = push.decode_payload()?;

        tracing::debug!("Update for {}/{} ({})", push.model, push.id, local);
        self.host.on_updated(&local, &push.id, payload);
        Ok(())
    }

    /// Deliver one frame from the deleted channel.
    pub async fn on_deleted(&self, frame: &str) -> Result<(), ClientError> {
        let push = DeletePush::from_frame(frame)?;
        let local = self.local_name(&push.model).await?;

        tracing::debug!("Delete for {}/{} ({})", push.model, push.id, local);
        self.host.on_deleted(&local, &push.id);
        Ok(())
    }

    /// Pump both push channels until they close.
    pub async fn run(
        self: Arc<Self>,
        mut updated: mpsc::UnboundedReceiver<String>,
        mut deleted: mpsc::UnboundedReceiver<String>,
    ) {
        let updates = async {
            while let Some(frame) = updated.recv().await {
                if let Err(e) = self.on_updated(&frame).await {
                    self.host.on_dispatch_error(&e);
                }
            }
        };
        let deletes = async {
            while let Some(frame) = deleted.recv().await {
                if let Err(e) = self.on_deleted(&frame).await {
                    self.host.on_dispatch_error(&e);
                }
            }
        };
        tokio::join!(updates, deletes);
        tracing::debug!("Push channels closed");
    }

    async fn local_name(&self, wire_type: &str) -> Result<String, ClientError> {
        if let Some(local) = self.bindings.read().await.resolve(wire_type) {
            return Ok(local.to_string());
        }
        if self.strict {
            return Err(ClientError::UnboundType(wire_type.to_string()));
        }

        let local = self
            .host
            .resolve_local_name(wire_type)
            .ok_or_else(|| ClientError::UnresolvedType(wire_type.to_string()))?;
        self.bindings.write().await.bind(wire_type, &local);
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Updated(String, String, Value),
        Deleted(String, String),
        Error(String),
    }

    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingHost {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SyncHost for RecordingHost {
        async fn connection_message(&self) -> Result<String, HostError> {
            Ok(String::new())
        }
        fn resolve_local_name(&self, wire_type: &str) -> Option<String> {
            match wire_type {
                "article" => Some("post".into()),
                "comment" => Some("reply".into()),
                _ => None,
            }
        }
        fn on_updated(&self, local_name: &str, id: &str, payload: Value) {
            self.calls.lock().unwrap().push(Call::Updated(
                local_name.into(),
                id.into(),
                payload,
            ));
        }
        fn on_deleted(&self, local_name: &str, id: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Deleted(local_name.into(), id.into()));
        }
        fn on_dispatch_error(&self, error: &ClientError) {
            self.calls.lock().unwrap().push(Call::Error(error.to_string()));
        }
    }

    fn dispatcher(strict: bool) -> (Arc<RecordingHost>, Dispatcher) {
        let host = Arc::new(RecordingHost::default());
        let mut bindings = TypeBindings::new();
        bindings.bind("article", "post");
        let dispatcher = Dispatcher::new(host.clone(), Arc::new(RwLock::new(bindings)), strict);
        (host, dispatcher)
    }

    // ===========================================
    // Update Tests
    // ===========================================

    #[tokio::test]
    async fn update_reaches_host_under_local_name() {
        let (host, dispatcher) = dispatcher(false);

        dispatcher
            .on_updated(r#"{"model":"article","id":"1","payload":"{\"title\":\"x\"}"}"#)
            .await
            .unwrap();

        assert_eq!(
            host.calls(),
            vec![Call::Updated("post".into(), "1".into(), json!({"title": "x"}))]
        );
    }

    #[tokio::test]
    async fn numeric_id_is_accepted() {
        let (host, dispatcher) = dispatcher(false);

        dispatcher
            .on_updated(r#"{"model":"article","id":42,"payload":"{}"}"#)
            .await
            .unwrap();

        assert_eq!(
            host.calls(),
            vec![Call::Updated("post".into(), "42".into(), json!({}))]
        );
    }

    #[tokio::test]
    async fn invalid_payload_is_an_error() {
        let (host, dispatcher) = dispatcher(false);

        let result = dispatcher
            .on_updated(r#"{"model":"article","id":"1","payload":"not json"}"#)
            .await;

        assert!(matches!(result, Err(ClientError::Wire(_))));
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_is_an_error() {
        let (_host, dispatcher) = dispatcher(false);

        let result = dispatcher.on_updated("garbage").await;
        assert!(matches!(result, Err(ClientError::Wire(_))));
    }

    // ===========================================
    // Delete Tests
    // ===========================================

    #[tokio::test]
    async fn delete_reaches_host_under_local_name() {
        let (host, dispatcher) = dispatcher(false);

        dispatcher
            .on_deleted(r#"{"model":"article","id":"1"}"#)
            .await
            .unwrap();

        assert_eq!(host.calls(), vec![Call::Deleted("post".into(), "1".into())]);
    }

    // ===========================================
    // Type Resolution Tests
    // ===========================================

    #[tokio::test]
    async fn unresolvable_type_is_an_error() {
        let (host, dispatcher) = dispatcher(false);

        let result = dispatcher.on_deleted(r#"{"model":"mystery","id":"1"}"#).await;

        assert!(matches!(result, Err(ClientError::UnresolvedType(t)) if t == "mystery"));
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn lenient_mode_binds_on_first_push() {
        let (host, dispatcher) = dispatcher(false);

        dispatcher
            .on_deleted(r#"{"model":"comment","id":"5"}"#)
            .await
            .unwrap();

        assert_eq!(dispatcher.bindings.read().await.resolve("comment"), Some("reply"));
        assert_eq!(host.calls(), vec![Call::Deleted("reply".into(), "5".into())]);
    }

    #[tokio::test]
    async fn strict_mode_rejects_untracked_types() {
        let (host, dispatcher) = dispatcher(true);

        let result = dispatcher.on_deleted(r#"{"model":"comment","id":"5"}"#).await;
        assert!(matches!(result, Err(ClientError::UnboundType(_))));

        // Bound types still flow
        dispatcher
            .on_deleted(r#"{"model":"article","id":"1"}"#)
            .await
            .unwrap();
        assert_eq!(host.calls(), vec![Call::Deleted("post".into(), "1".into())]);
    }

    // ===========================================
    // Pump Tests
    // ===========================================

    #[tokio::test]
    async fn run_surfaces_errors_and_keeps_going() {
        let (host, dispatcher) = dispatcher(false);
        let (updated_tx, updated_rx) = mpsc::unbounded_channel();
        let (deleted_tx, deleted_rx) = mpsc::unbounded_channel();

        updated_tx
            .send(r#"{"model":"mystery","id":"1","payload":"{}"}"#.to_string())
            .unwrap();
        updated_tx
            .send(r#"{"model":"article","id":"2","payload":"{}"}"#.to_string())
            .unwrap();
        deleted_tx
            .send(r#"{"model":"article","id":"3"}"#.to_string())
            .unwrap();
        drop(updated_tx);
        drop(deleted_tx);

        Arc::new(dispatcher).run(updated_rx, deleted_rx).await;

        let calls = host.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.contains(&Call::Error("unresolved type: mystery".into())));
        assert!(calls.contains(&Call::Updated("post".into(), "2".into(), json!({}))));
        assert!(calls.contains(&Call::Deleted("post".into(), "3".into())));
    }
}
