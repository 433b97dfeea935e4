//! Error types for the streaming client

use thiserror::Error;

/// Lifecycle errors surfaced by the streaming client. Connect failures leave
/// the client `Idle`; handshake and transport failures leave it `Closed`.
/// Per-frame decode failures and subscriber delivery faults are logged inside
/// the receive loop and never appear here.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("failed to connect to feed: {0}")]
    Connect(String),

    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("feed transport error: {0}")]
    Transport(String),

    #[error("client already closed")]
    AlreadyClosed,

    #[error("client already running")]
    AlreadyRunning,

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),
}

/// A single inbound frame could not be decoded. The receive loop logs these
/// and moves on to the next frame.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Errors from the order-book snapshot fetcher.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("orderbook request failed: {0}")]
    Http(String),

    #[error("orderbook request rejected: {0}")]
    Rejected(String),

    #[error("malformed orderbook response: {0}")]
    Malformed(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
