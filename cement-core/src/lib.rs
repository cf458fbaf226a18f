//! # cement-core
//!
//! Pure logic for cement realtime sync (no I/O, instant tests).
//!
//! This crate implements the state machines and bookkeeping for the realtime
//! layer without any network I/O or async runtime, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O is performed by `cement-client`, which interprets the
//! actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod bindings;
pub mod pending;
pub mod state;
pub mod subscriptions;

pub use backoff::ReconnectPolicy;
pub use bindings::TypeBindings;
pub use pending::{PendingError, PendingTable};
pub use state::{Action, ConnectionEvent, ConnectionState, Event};
pub use subscriptions::SubscriptionSet;
