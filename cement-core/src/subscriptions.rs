//! Subscription set for cement.
//!
//! Records every (type, id) pair the host has asked to be notified about,
//! grouped per wire-level type. Entries are never removed: the service keeps
//! a subscription for the lifetime of the connection and there is no
//! unsubscribe message.
//!
//! Each entry also remembers the connection epoch it was last subscribed on.
//! Claiming a pair for an epoch succeeds once per epoch, which is what keeps
//! an immediate subscribe from `track` and a replay racing on the same new
//! connection from sending the same request twice.

use std::collections::BTreeMap;
use cement_types::ResourceRef;

/// Tracked subscriptions, grouped by wire-level type.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    /// type -> id -> epoch of the last subscribe sent for it.
    by_type: BTreeMap<String, BTreeMap<String, Option<u64>>>,
}

impl SubscriptionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair. Returns `false` if it was already tracked.
    pub fn insert(&mut self, resource_type: &str, resource_id: &str) -> bool {
        let ids = self.by_type.entry(resource_type.to_string()).or_default();
        if ids.contains_key(resource_id) {
            return false;
        }
        ids.insert(resource_id.to_string(), None);
        true
    }

    /// Check whether a pair is tracked.
    pub fn contains(&self, resource_type: &str, resource_id: &str) -> bool {
        self.by_type
            .get(resource_type)
            .is_some_and(|ids| ids.contains_key(resource_id))
    }

    /// Claim a tracked pair for subscribing on `epoch`.
    ///
    /// Returns `true` if the caller should send the subscribe request, i.e.
    /// the pair is tracked and was not yet claimed for this epoch.
    pub fn claim(&mut self, resource_type: &str, resource_id: &str, epoch: u64) -> bool {
        match self
            .by_type
            .get_mut(resource_type)
            .and_then(|ids| ids.get_mut(resource_id))
        {
            Some(last) if *last != Some(epoch) => {
                *last = Some(epoch);
                true
            }
            _ => false,
        }
    }

    /// Release a claim taken on `epoch` so the pair can be claimed again.
    ///
    /// Used when the subscribe for that claim failed. A claim since taken
    /// for a different epoch is left alone. Returns `true` if released.
    pub fn unclaim(&mut self, resource_type: &str, resource_id: &str, epoch: u64) -> bool {
        match self
            .by_type
            .get_mut(resource_type)
            .and_then(|ids| ids.get_mut(resource_id))
        {
            Some(last) if *last == Some(epoch) => {
                *last = None;
                true
            }
            _ => false,
        }
    }

    /// Claim every pair not yet subscribed on `epoch`.
    pub fn claim_all(&mut self, epoch: u64) -> Vec<ResourceRef> {
        let mut claimed = Vec::new();
        for (resource_type, ids) in &mut self.by_type {
            for (resource_id, last) in ids.iter_mut() {
                if *last != Some(epoch) {
                    *last = Some(epoch);
                    claimed.push(ResourceRef::new(resource_type.clone(), resource_id.clone()));
                }
            }
        }
        claimed
    }

    /// All tracked pairs, ordered by type then id.
    pub fn resources(&self) -> Vec<ResourceRef> {
        self.by_type
            .iter()
            .flat_map(|(resource_type, ids)| {
                ids.keys()
                    .map(move |resource_id| ResourceRef::new(resource_type.clone(), resource_id.clone()))
            })
            .collect()
    }

    /// Wire-level types with at least one tracked id.
    pub fn types(&self) -> Vec<&str> {
        self.by_type
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(t, _)| t.as_str())
            .collect()
    }

    /// Check whether any id of this type is tracked.
    pub fn has_type(&self, resource_type: &str) -> bool {
        self.by_type
            .get(resource_type)
            .is_some_and(|ids| !ids.is_empty())
    }

    /// Number of tracked pairs.
    pub fn len(&self) -> usize {
        self.by_type.values().map(BTreeMap::len).sum()
    }

    /// Check if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
