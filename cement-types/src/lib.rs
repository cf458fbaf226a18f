//! # cement-types
//!
//! Wire format types for the cement realtime channel protocol.
//!
//! This crate provides the foundational types used across all cement crates:
//! - [`CorrelationId`], [`ResourceRef`] - Identity types
//! - [`Envelope`], [`Reply`] - Request/response frames of a correlated channel
//! - [`SubscribeRequest`], [`UpdatePush`], [`DeletePush`] - Channel payloads
//! - [`HandshakeReply`] - Sentinels answering the connection message
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channels;
mod envelope;
mod error;
mod ids;
mod messages;

pub use envelope::{Envelope, Reply, STATUS_OK};
pub use error::WireError;
pub use ids::{CorrelationId, ResourceRef};
pub use messages::{DeletePush, HandshakeReply, SubscribeRequest, UpdatePush};
