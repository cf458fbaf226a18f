//! Connection state machine for cement.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! connection lifecycle. The state machine takes events as input and produces
//! a new state plus a list of actions to execute.
//!
//! The actual I/O (sending the connection message, failing pending requests,
//! asking the transport to reconnect) is performed by cement-client, not by
//! this module.
//!
//! Every transport-level connect is tagged with an epoch. Handshake results
//! carry the epoch they were started for, so a late result from an abandoned
//! attempt can never mark a newer connection as accepted.

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No usable connection.
    #[default]
    Disconnected,
    /// Transport is open, handshake in flight.
    Connecting {
        /// Epoch of the transport connection being handshaken.
        epoch: u64,
    },
    /// Handshake accepted; the connection is usable.
    Connected {
        /// Epoch of the accepted transport connection.
        epoch: u64,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (cement-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Transport came up
            (Self::Disconnected, Event::TransportConnected { epoch }) => (
                Self::Connecting { epoch },
                vec![Action::StartHandshake { epoch }],
            ),
            (Self::Connecting { .. }, Event::TransportConnected { epoch }) => (
                Self::Connecting { epoch },
                vec![Action::CancelHandshake, Action::StartHandshake { epoch }],
            ),
            (Self::Connected { .. }, Event::TransportConnected { epoch }) => (
                Self::Connecting { epoch },
                vec![
                    Action::FailPending {
                        reason: "transport reconnected".into(),
                    },
                    Action::EmitEvent(ConnectionEvent::Disconnected {
                        reason: "transport reconnected".into(),
                    }),
                    Action::StartHandshake { epoch },
                ],
            ),

            // Handshake outcome
            (Self::Connecting { epoch }, Event::HandshakeAccepted { epoch: done })
                if epoch == done =>
            {
                (
                    Self::Connected { epoch },
                    vec![Action::EmitEvent(ConnectionEvent::Connected { epoch })],
                )
            }
            (Self::Connecting { epoch }, Event::HandshakeFailed { epoch: done, error })
                if epoch == done =>
            {
                (
                    Self::Disconnected,
                    vec![
                        Action::EmitEvent(ConnectionEvent::HandshakeFailed {
                            error: error.clone(),
                        }),
                        Action::RecycleTransport { reason: error },
                    ],
                )
            }

            // Transport went away
            (Self::Connecting { .. }, Event::TransportDisconnected { reason }) => (
                Self::Disconnected,
                vec![Action::CancelHandshake, Action::FailPending { reason }],
            ),
            (Self::Connected { .. }, Event::TransportDisconnected { reason }) => (
                Self::Disconnected,
                vec![
                    Action::FailPending {
                        reason: reason.clone(),
                    },
                    Action::EmitEvent(ConnectionEvent::Disconnected { reason }),
                ],
            ),

            // Transport errors revert to Disconnected from any state
            (Self::Disconnected, Event::TransportError { error }) => (
                Self::Disconnected,
                vec![Action::EmitEvent(ConnectionEvent::TransportError { error })],
            ),
            (Self::Connecting { .. }, Event::TransportError { error }) => (
                Self::Disconnected,
                vec![
                    Action::EmitEvent(ConnectionEvent::TransportError {
                        error: error.clone(),
                    }),
                    Action::CancelHandshake,
                    Action::FailPending { reason: error },
                ],
            ),
            (Self::Connected { .. }, Event::TransportError { error }) => (
                Self::Disconnected,
                vec![
                    Action::EmitEvent(ConnectionEvent::TransportError {
                        error: error.clone(),
                    }),
                    Action::FailPending {
                        reason: error.clone(),
                    },
                    Action::EmitEvent(ConnectionEvent::Disconnected { reason: error }),
                ],
            ),

            // Teardown
            (Self::Disconnected, Event::Shutdown) => (
                Self::Disconnected,
                vec![Action::FailPending {
                    reason: "shutdown".into(),
                }],
            ),
            (Self::Connecting { .. }, Event::Shutdown) => (
                Self::Disconnected,
                vec![
                    Action::CancelHandshake,
                    Action::FailPending {
                        reason: "shutdown".into(),
                    },
                ],
            ),
            (Self::Connected { .. }, Event::Shutdown) => (
                Self::Disconnected,
                vec![
                    Action::FailPending {
                        reason: "shutdown".into(),
                    },
                    Action::EmitEvent(ConnectionEvent::Disconnected {
                        reason: "shutdown".into(),
                    }),
                ],
            ),

            // Stale handshake results, duplicate disconnects - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if the handshake has been accepted.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if a handshake is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. })
    }

    /// Epoch of the accepted connection, if connected.
    pub fn connected_epoch(&self) -> Option<u64> {
        match self {
            Self::Connected { epoch } => Some(*epoch),
            _ => None,
        }
    }

    /// Coarse name of the state, for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting { .. } => "connecting",
            Self::Connected { .. } => "connected",
        }
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Transport reported an open physical connection.
    TransportConnected {
        /// Fresh epoch assigned to this connection.
        epoch: u64,
    },
    /// Transport reported the physical connection closed.
    TransportDisconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Transport reported a socket-level error.
    TransportError {
        /// Error message describing the failure.
        error: String,
    },
    /// Service answered the connection message with acceptance.
    HandshakeAccepted {
        /// Epoch the handshake was started for.
        epoch: u64,
    },
    /// Handshake was disallowed, timed out, or could not be sent.
    HandshakeFailed {
        /// Epoch the handshake was started for.
        epoch: u64,
        /// Error message describing the failure.
        error: String,
    },
    /// Owner is tearing the connection layer down.
    Shutdown,
}

/// Actions to be executed by cement-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send the connection message and await the sentinel reply.
    StartHandshake {
        /// Epoch to tag the handshake result with.
        epoch: u64,
    },
    /// Abort any handshake task still running.
    CancelHandshake,
    /// Reject every pending correlated request.
    FailPending {
        /// Reason reported to the waiting callers.
        reason: String,
    },
    /// Drop the physical connection so the transport's reconnect loop runs.
    RecycleTransport {
        /// Reason passed to the transport.
        reason: String,
    },
    /// Emit an event to observers.
    EmitEvent(ConnectionEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake accepted; subscriptions should be replayed.
    Connected {
        /// Epoch of the accepted connection.
        epoch: u64,
    },
    /// A previously accepted connection was lost.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// The handshake was disallowed or timed out.
    HandshakeFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The transport reported a socket-level error.
    TransportError {
        /// Error message describing the failure.
        error: String,
    },
}
