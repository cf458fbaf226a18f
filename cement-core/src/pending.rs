//! Pending request table for correlated channels.
//!
//! This module tracks requests that have been sent but not yet answered:
//! - One waiter per correlation id (ids are never reused while pending)
//! - Max size limit to prevent unbounded memory growth
//! - Draining, so a lost connection can reject every waiter at once
//!
//! The table is generic over the waiter type. cement-client stores oneshot
//! senders in it; tests here store plain values.

use std::collections::HashMap;
use cement_types::CorrelationId;

/// Error type for pending table operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingError {
    /// Table is at capacity.
    Full {
        /// Current table capacity.
        capacity: usize,
    },
    /// A waiter is already registered under this id.
    Duplicate(CorrelationId),
}

impl std::fmt::Display for PendingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingError::Full { capacity } => {
                write!(f, "too many pending requests (capacity: {})", capacity)
            }
            PendingError::Duplicate(id) => {
                write!(f, "correlation id {} is already pending", id)
            }
        }
    }
}

impl std::error::Error for PendingError {}

/// Outstanding requests keyed by correlation id.
#[derive(Debug)]
pub struct PendingTable<W> {
    /// Maximum number of outstanding requests.
    max_pending: usize,
    /// Waiters by correlation id.
    waiters: HashMap<CorrelationId, W>,
}

impl<W> PendingTable<W> {
    /// Create a new table with the given maximum size.
    pub fn new(max_pending: usize) -> Self {
        Self {
            max_pending,
            waiters: HashMap::new(),
        }
    }

    /// Register a waiter.
    ///
    /// Fails if the id is already pending or the table is full. The table is
    /// left unchanged on failure.
    pub fn insert(&mut self, id: CorrelationId, waiter: W) -> Result<(), PendingError> {
        if self.waiters.contains_key(&id) {
            return Err(PendingError::Duplicate(id));
        }
        if self.waiters.len() >= self.max_pending {
            return Err(PendingError::Full {
                capacity: self.max_pending,
            });
        }
        self.waiters.insert(id, waiter);
        Ok(())
    }

    /// Remove and return the waiter for `id`, if any.
    pub fn take(&mut self, id: &CorrelationId) -> Option<W> {
        self.waiters.remove(id)
    }

    /// Remove and return every waiter.
    pub fn drain(&mut self) -> Vec<(CorrelationId, W)> {
        self.waiters.drain().collect()
    }

    /// Check whether `id` is pending.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.waiters.contains_key(id)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Check if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Get the maximum number of outstanding requests.
    pub fn capacity(&self) -> usize {
        self.max_pending
    }
}
