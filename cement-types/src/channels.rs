//! Names of the sub-channels multiplexed over one socket.

/// Correlated channel carrying subscribe requests and their replies.
pub const SUBSCRIBE: &str = "subscribe";

/// Push channel for updated resources.
pub const UPDATED: &str = "updated";

/// Push channel for deleted resources.
pub const DELETED: &str = "deleted";

/// Dedicated exchange for the connection message and its sentinel reply.
pub const HANDSHAKE: &str = "connection";
