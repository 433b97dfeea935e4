//! Streaming client for the Bithumb public feed
//!
//! Owns the connection lifecycle and fans decoded records out to registered
//! subscribers. Reconnection policy deliberately lives with the caller.

mod client;
mod registry;
mod transport;

pub use client::{FeedClient, FeedStats};
pub use registry::{Subscriber, SubscriptionId};

/// Connection lifecycle of a [`FeedClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, never run
    Idle,
    /// Transport dial in progress
    Connecting,
    /// Handshake acknowledged
    Subscribed,
    /// Receive loop delivering records
    Streaming,
    /// Stop requested, receive loop winding down
    Stopping,
    /// Terminal; the client cannot be reused
    Closed,
}
