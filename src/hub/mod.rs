//! The `hub` module is the fan-out core of boardhub.
//!
//! A [`Hub`] hands out one [`Subscription`] per subscriber and topic. Every
//! subscription owns the sending half of a bounded mailbox whose receiving
//! half is read by exactly one connection. Broadcasts are delivered with a
//! non-blocking enqueue, so a subscriber that cannot keep up loses messages
//! instead of slowing down the sender or the rest of the topic.
//!
//! `subscribe` and `broadcast` are async so that decorators can reach a
//! snapshot store without parking a runtime thread. The in-memory hub never
//! awaits inside them.
//!
//! - `registry`: topic to subscriber bookkeeping.
//! - `memory`: the in-process hub built on the registry.
//! - `snapshot`: a decorator that persists the latest payload per topic and
//!   replays it to new subscribers.

pub mod memory;
pub mod registry;
pub mod snapshot;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::utils::error::HubError;

pub use memory::MemoryHub;
pub use snapshot::SnapshotHub;

/// Default number of payloads a subscriber may have outstanding.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 4;

/// Sending half of a subscriber mailbox. Held by the hub.
pub type Mailbox = mpsc::Sender<Bytes>;

/// Receiving half of a subscriber mailbox. Read by the owning connection.
pub type Inbox = mpsc::Receiver<Bytes>;

/// Creates a bounded mailbox. A capacity of zero is raised to one.
pub fn mailbox(capacity: usize) -> (Mailbox, Inbox) {
    mpsc::channel(capacity.max(1))
}

/// Registers subscribers on topics.
#[async_trait]
pub trait Hub: Send + Sync {
    /// Registers `mailbox` under `topic`. Never fails.
    async fn subscribe(&self, topic: &str, mailbox: Mailbox) -> Box<dyn Subscription>;
}

/// Membership of one subscriber in one topic.
///
/// Dropping a subscription closes it.
#[async_trait]
pub trait Subscription: Send + Sync {
    fn topic(&self) -> &str;

    /// Delivers `payload` to every other subscription on the same topic.
    /// Full mailboxes are skipped without reporting an error.
    async fn broadcast(&self, payload: Bytes) -> Result<(), HubError>;

    /// Delivers `payload` to this subscription only.
    fn send(&self, payload: Bytes) -> Result<(), HubError>;

    /// Leaves the topic. Calling it more than once is a no-op.
    fn close(&self) -> Result<(), HubError>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
impl<H: Hub + ?Sized> Hub for Arc<H> {
    async fn subscribe(&self, topic: &str, mailbox: Mailbox) -> Box<dyn Subscription> {
        (**self).subscribe(topic, mailbox).await
    }
}

#[async_trait]
impl<H: Hub + ?Sized> Hub for Box<H> {
    async fn subscribe(&self, topic: &str, mailbox: Mailbox) -> Box<dyn Subscription> {
        (**self).subscribe(topic, mailbox).await
    }
}

#[cfg(test)]
mod tests;
