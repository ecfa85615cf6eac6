//! Per-client connection adapter.
//!
//! A [`Connection`] moves through `Connecting -> Active -> Closed`. While
//! active it runs two loops concurrently:
//!
//! - inbound: every message read from the client is broadcast to the topic;
//! - outbound: every payload landing in the mailbox is written to the client.
//!
//! Whichever loop ends first (or a shutdown request) cancels the other, and
//! the subscription is closed exactly once before `run` returns. The adapter
//! never drops messages itself; that is left to the hub's mailbox policy.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::hub::{DEFAULT_MAILBOX_CAPACITY, Hub, mailbox};
use crate::transport::{MessageSink, MessageSource};
use crate::utils::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

/// Why a connection left the `Active` state.
#[derive(Debug)]
pub enum Disconnect {
    /// The client closed the stream.
    ClientClosed,
    ReadFailed(TransportError),
    WriteFailed(TransportError),
    /// Every sender of the mailbox is gone.
    MailboxClosed,
    /// The server is shutting down.
    Shutdown,
}

pub struct Connection {
    id: String,
    topic: String,
    hub: Arc<dyn Hub>,
    mailbox_capacity: usize,
    state: ConnectionState,
}

impl Connection {
    pub fn new(hub: Arc<dyn Hub>, topic: impl Into<String>) -> Self {
        Self {
            id: format!("conn-{}", uuid::Uuid::new_v4()),
            topic: topic.into(),
            hub,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            state: ConnectionState::Connecting,
        }
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Subscribes to the topic and pumps messages until the client goes away,
    /// a write fails or `shutdown` flips to `true`.
    ///
    /// Only the first call does anything; later calls return
    /// `Disconnect::ClientClosed` immediately.
    pub async fn run<R, W>(
        &mut self,
        mut source: R,
        mut sink: W,
        mut shutdown: watch::Receiver<bool>,
    ) -> Disconnect
    where
        R: MessageSource,
        W: MessageSink,
    {
        if self.state != ConnectionState::Connecting {
            return Disconnect::ClientClosed;
        }

        let (tx, mut inbox) = mailbox(self.mailbox_capacity);
        let subscription = self.hub.subscribe(&self.topic, tx).await;
        self.state = ConnectionState::Active;
        info!(id = %self.id, topic = %self.topic, "connection active");

        let inbound = async {
            loop {
                match source.receive().await {
                    Ok(Some(payload)) => {
                        if let Err(e) = subscription.broadcast(payload).await {
                            debug!(id = %self.id, error = %e, "broadcast rejected");
                        }
                    }
                    Ok(None) => return Disconnect::ClientClosed,
                    Err(e) => return Disconnect::ReadFailed(e),
                }
            }
        };

        let outbound = async {
            while let Some(payload) = inbox.recv().await {
                if let Err(e) = sink.send(payload).await {
                    return Disconnect::WriteFailed(e);
                }
            }
            Disconnect::MailboxClosed
        };

        let reason = tokio::select! {
            reason = inbound => reason,
            reason = outbound => reason,
            _ = shutdown_requested(&mut shutdown) => Disconnect::Shutdown,
        };

        if let Err(e) = subscription.close() {
            warn!(id = %self.id, error = %e, "cannot close subscription");
        }
        self.state = ConnectionState::Closed;

        match &reason {
            Disconnect::ReadFailed(e) => warn!(id = %self.id, error = %e, "cannot read message"),
            Disconnect::WriteFailed(e) => warn!(id = %self.id, error = %e, "cannot write to client"),
            other => debug!(id = %self.id, reason = ?other, "connection finished"),
        }
        info!(id = %self.id, topic = %self.topic, "connection closed");

        reason
    }
}

/// Resolves once `shutdown` holds `true`. Never resolves if the sender is
/// dropped without requesting shutdown.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
