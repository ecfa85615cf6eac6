//! The `error` module defines the error types used within `boardhub`.
//!
//! Each layer owns one enum: the hub reports delivery conditions to its
//! immediate caller, stores report backend failures that the snapshot layer
//! only logs, and the transport reports failures that end a single
//! connection. `Error` is what startup code propagates up to `main`.

use std::time::Duration;

use thiserror::Error;

/// Conditions reported by a [`Subscription`](crate::hub::Subscription).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The subscriber's mailbox is full; the payload was not delivered.
    #[error("slow client")]
    SlowClient,

    /// The reader side of the subscriber's mailbox is gone.
    #[error("mailbox closed")]
    MailboxClosed,

    /// The subscription was already closed.
    #[error("subscription closed")]
    Closed,
}

/// Failures of a snapshot store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled failed: {0}")]
    Sled(#[from] sled::Error),

    #[error("redis failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    /// The blocking task running a store call panicked or was cancelled.
    #[error("store task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

/// Failures of the duplex message stream behind a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(tungstenite::Error),

    /// The stream was already closed by either side.
    #[error("connection closed")]
    Closed,
}

impl From<tungstenite::Error> for TransportError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            other => Self::WebSocket(other),
        }
    }
}

/// Process level errors surfaced while starting the server or the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
