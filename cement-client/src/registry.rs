//! SubscriptionRegistry - which resources the client tracks.
//!
//! Tracking is idempotent and survives disconnects. Each `(type, id)` pair
//! is subscribed at most once per accepted connection: a fresh `track()` on
//! a live connection and the replay that runs after a reconnect both claim
//! the pair for the current epoch under the same lock, so whichever gets
//! there first sends the subscribe and the other skips it.

use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use cement_core::{ConnectionEvent, SubscriptionSet, TypeBindings};
use cement_types::{Reply, ResourceRef};

use crate::client::ClientError;
use crate::connection::ConnectionManager;
use crate::host::SyncHost;

/// Result of [`SubscriptionRegistry::track`] and
/// [`SubscriptionRegistry::resubscribe`].
#[derive(Debug)]
pub enum TrackOutcome {
    /// Nothing was sent. For `track` the pair was already tracked; for
    /// `resubscribe` it is already subscribed on this connection.
    AlreadyTracked,
    /// Recorded while disconnected or while the connection was changing;
    /// the next accepted connection's replay subscribes it.
    Deferred,
    /// Recorded and subscribed on the live connection.
    Subscribed(Reply),
}

impl TrackOutcome {
    /// Whether this call added a new pair.
    pub fn is_new(&self) -> bool {
        !matches!(self, Self::AlreadyTracked)
    }
}

/// Summary of a reconnect replay.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Epoch the replay ran for.
    pub epoch: u64,
    /// Subscribes sent.
    pub attempted: usize,
    /// Subscribes the service accepted.
    pub succeeded: usize,
    /// Subscribes that failed, with the error.
    pub failures: Vec<(ResourceRef, ClientError)>,
}

impl ReplayReport {
    fn skipped(epoch: u64) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }
}

/// Tracked resource set plus the wire-to-local type bindings.
pub struct SubscriptionRegistry {
    connection: Arc<ConnectionManager>,
    host: Arc<dyn SyncHost>,
    subscriptions: Mutex<SubscriptionSet>,
    bindings: Arc<RwLock<TypeBindings>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new(
        connection: Arc<ConnectionManager>,
        host: Arc<dyn SyncHost>,
        bindings: Arc<RwLock<TypeBindings>>,
    ) -> Self {
        Self {
            connection,
            host,
            subscriptions: Mutex::new(SubscriptionSet::new()),
            bindings,
        }
    }

    /// Start tracking a remote resource.
    ///
    /// A no-op for pairs already tracked. Otherwise the pair is recorded,
    /// the type is bound to its local name, and if the connection is up the
    /// subscribe is sent immediately. A failed subscribe leaves the pair
    /// tracked but unclaimed, so [`SubscriptionRegistry::resubscribe`] or a
    /// manual replay can retry it on the same connection.
    pub async fn track(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<TrackOutcome, ClientError> {
        let claimed = {
            let mut subscriptions = self.subscriptions.lock().await;
            if !subscriptions.insert(resource_type, resource_id) {
                return Ok(TrackOutcome::AlreadyTracked);
            }
            self.connection
                .connected_epoch()
                .filter(|&epoch| subscriptions.claim(resource_type, resource_id, epoch))
        };

        tracing::debug!("Tracking {}/{}", resource_type, resource_id);
        self.bind_type(resource_type).await;

        match claimed {
            Some(epoch) => self.subscribe_claimed(resource_type, resource_id, epoch).await,
            None => Ok(TrackOutcome::Deferred),
        }
    }

    /// Subscribe a pair again on the current connection.
    ///
    /// For retrying after a rejected or failed subscribe. Tracks the pair if
    /// it was not tracked yet. Returns `AlreadyTracked` when a subscribe for
    /// the pair was already sent on this connection and `Deferred` while
    /// disconnected.
    pub async fn resubscribe(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<TrackOutcome, ClientError> {
        let claimed = {
            let mut subscriptions = self.subscriptions.lock().await;
            subscriptions.insert(resource_type, resource_id);
            self.connection
                .connected_epoch()
                .map(|epoch| (epoch, subscriptions.claim(resource_type, resource_id, epoch)))
        };

        self.bind_type(resource_type).await;

        match claimed {
            Some((epoch, true)) => self.subscribe_claimed(resource_type, resource_id, epoch).await,
            Some((_, false)) => Ok(TrackOutcome::AlreadyTracked),
            None => Ok(TrackOutcome::Deferred),
        }
    }

    /// Track an entity the host just loaded, if the host wants it tracked.
    ///
    /// Returns `None` when the host's filter declined it.
    pub async fn observe(&self, resource: &ResourceRef) -> Result<Option<TrackOutcome>, ClientError> {
        if !self.host.should_track(resource) {
            return Ok(None);
        }
        self.track(&resource.resource_type, &resource.resource_id)
            .await
            .map(Some)
    }

    /// Subscribe every tracked pair not yet subscribed on `epoch`.
    ///
    /// Subscribes run concurrently. A pair whose subscribe fails is released
    /// again, so a later manual replay on the same connection retries it;
    /// the automatic replay runs once per accepted connection.
    pub async fn replay(&self, epoch: u64) -> ReplayReport {
        if self.connection.connected_epoch() != Some(epoch) {
            tracing::debug!(epoch, "Skipping replay for superseded connection");
            return ReplayReport::skipped(epoch);
        }

        let claimed = self.subscriptions.lock().await.claim_all(epoch);
        if claimed.is_empty() {
            return ReplayReport::skipped(epoch);
        }

        tracing::info!(epoch, "Replaying {} subscriptions", claimed.len());
        let results = join_all(claimed.iter().map(|resource| {
            self.subscribe_claimed(&resource.resource_type, &resource.resource_id, epoch)
        }))
        .await;

        let mut report = ReplayReport::skipped(epoch);
        for (resource, result) in claimed.into_iter().zip(results) {
            match result {
                Ok(TrackOutcome::Subscribed(_)) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                }
                // Superseded mid-replay; the next connection's replay owns it
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Replay subscribe for {} failed: {}", resource, e);
                    report.attempted += 1;
                    report.failures.push((resource, e));
                }
            }
        }
        report
    }

    /// Replay on every accepted connection until the event stream closes.
    ///
    /// Each replay that sent anything is reported through
    /// [`SyncHost::on_replay`].
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ConnectionEvent>) {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Connected { epoch }) => self.replay_and_report(epoch).await,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Registry missed {} connection events", skipped);
                    if let Some(epoch) = self.connection.connected_epoch() {
                        self.replay_and_report(epoch).await;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Register for connection events now and replay from a spawned task.
    pub fn spawn_replay_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let events = self.connection.events();
        tokio::spawn(Arc::clone(self).run(events))
    }

    /// Whether a pair is tracked.
    pub async fn is_tracked(&self, resource_type: &str, resource_id: &str) -> bool {
        self.subscriptions
            .lock()
            .await
            .contains(resource_type, resource_id)
    }

    /// Every tracked pair, ordered by type then id.
    pub async fn tracked(&self) -> Vec<ResourceRef> {
        self.subscriptions.lock().await.resources()
    }

    /// Distinct wire types with at least one tracked pair.
    pub async fn tracked_types(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .await
            .types()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Number of tracked pairs.
    pub async fn len(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Whether nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.subscriptions.lock().await.is_empty()
    }

    /// Shared wire-to-local type bindings.
    pub fn bindings(&self) -> Arc<RwLock<TypeBindings>> {
        Arc::clone(&self.bindings)
    }

    async fn replay_and_report(&self, epoch: u64) {
        let report = self.replay(epoch).await;
        if report.attempted > 0 {
            self.host.on_replay(&report);
        }
    }

    /// Send the subscribe for a pair claimed on `epoch`.
    ///
    /// Skipped when the connection changed since the claim. A failure
    /// releases the claim.
    async fn subscribe_claimed(
        &self,
        resource_type: &str,
        resource_id: &str,
        epoch: u64,
    ) -> Result<TrackOutcome, ClientError> {
        if self.connection.connected_epoch() != Some(epoch) {
            return Ok(TrackOutcome::Deferred);
        }
        match self.connection.subscribe(resource_type, resource_id).await {
            Ok(reply) => Ok(TrackOutcome::Subscribed(reply)),
            Err(e) => {
                self.subscriptions
                    .lock()
                    .await
                    .unclaim(resource_type, resource_id, epoch);
                Err(e)
            }
        }
    }

    async fn bind_type(&self, wire_type: &str) {
        if self.bindings.read().await.is_bound(wire_type) {
            return;
        }
        match self.host.resolve_local_name(wire_type) {
            Some(local) => {
                tracing::debug!("Bound wire type {} to {}", wire_type, local);
                self.bindings.write().await.bind(wire_type, &local);
            }
            None => tracing::warn!("No local name for wire type {}", wire_type),
        }
    }
}
