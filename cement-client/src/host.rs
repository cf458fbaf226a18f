//! Collaborators supplied by the host application.
//!
//! The realtime layer does not own the local record cache. Everything it
//! needs from the host (the connection message, which entities to track,
//! how wire type names map to local ones, and where pushed changes go) comes
//! through [`SyncHost`].

use async_trait::async_trait;
use serde_json::Value;

use cement_types::ResourceRef;

use crate::client::ClientError;
use crate::registry::ReplayReport;

/// Error type hosts may return from [`SyncHost::connection_message`].
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

/// Host application hooks.
#[async_trait]
pub trait SyncHost: Send + Sync {
    /// Produce the connection message sent during the handshake.
    ///
    /// May suspend, e.g. to fetch a fresh token.
    async fn connection_message(&self) -> Result<String, HostError>;

    /// Decide whether an observed entity should be tracked.
    fn should_track(&self, _resource: &ResourceRef) -> bool {
        true
    }

    /// Map a wire-level type name to the host's local name.
    fn resolve_local_name(&self, wire_type: &str) -> Option<String>;

    /// A tracked resource changed.
    fn on_updated(&self, local_name: &str, id: &str, payload: Value);

    /// A tracked resource was deleted.
    fn on_deleted(&self, local_name: &str, id: &str);

    /// A push could not be dispatched.
    fn on_dispatch_error(&self, error: &ClientError) {
        tracing::error!("Dropped realtime push: {}", error);
    }

    /// The automatic replay after an accepted connection finished.
    ///
    /// Failed pairs stay tracked; `RealtimeClient::resubscribe` retries one
    /// on the same connection.
    fn on_replay(&self, report: &ReplayReport) {
        if report.failures.is_empty() {
            tracing::debug!(epoch = report.epoch, "Replayed {} subscriptions", report.succeeded);
        } else {
            tracing::warn!(
                epoch = report.epoch,
                "{} of {} replayed subscriptions failed",
                report.failures.len(),
                report.attempted
            );
        }
    }
}
