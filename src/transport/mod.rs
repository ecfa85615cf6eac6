//! The `transport` module connects clients to the hub.
//!
//! A connection only needs a duplex message stream, split into a
//! [`MessageSource`] and a [`MessageSink`]. `connection` bridges such a pair
//! to one hub subscription, and `websocket` provides the WebSocket server and
//! the stream implementations over `tokio-tungstenite`.

pub mod connection;
pub mod websocket;

use std::future::Future;

use bytes::Bytes;

use crate::utils::error::TransportError;

pub use connection::{Connection, ConnectionState, Disconnect};
pub use websocket::{serve, start_websocket_server};

/// Inbound half of a duplex message stream.
pub trait MessageSource: Send {
    /// Waits for the next message. `Ok(None)` means the peer closed the
    /// stream.
    fn receive(&mut self) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;
}

/// Outbound half of a duplex message stream.
pub trait MessageSink: Send {
    fn send(&mut self, payload: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;
}
