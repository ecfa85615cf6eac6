//! In-process fan-out hub.
//!
//! All registry reads and writes go through one mutex per hub instance. The
//! critical sections only touch the map and attempt non-blocking enqueues,
//! so the lock is never held across I/O or an `.await`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::hub::registry::{Registry, SubscriberId};
use crate::hub::{Hub, Mailbox, Subscription};
use crate::utils::error::HubError;

#[derive(Debug, Default)]
struct Shared {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Every critical section leaves the map consistent, so a panic in
        // another holder doesn't invalidate it.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hub keeping every subscription in process memory.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    shared: Arc<Shared>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.shared.lock().topic_count()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared.lock().subscriber_count(topic)
    }
}

#[async_trait]
impl Hub for MemoryHub {
    async fn subscribe(&self, topic: &str, mailbox: Mailbox) -> Box<dyn Subscription> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.lock().insert(topic, id, mailbox.clone());
        trace!(topic, subscriber = id, "subscribed");

        Box::new(MemorySubscription {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            id,
            mailbox,
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
struct MemorySubscription {
    shared: Arc<Shared>,
    topic: String,
    id: SubscriberId,
    mailbox: Mailbox,
    closed: AtomicBool,
}

impl MemorySubscription {
    fn ensure_open(&self) -> Result<(), HubError> {
        if self.is_closed() {
            Err(HubError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn broadcast(&self, payload: Bytes) -> Result<(), HubError> {
        self.ensure_open()?;

        let mut dropped = 0usize;
        {
            let registry = self.shared.lock();
            for (id, mailbox) in registry.subscribers(&self.topic) {
                // do not broadcast to the sender
                if id == self.id {
                    continue;
                }
                match mailbox.try_send(payload.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => dropped += 1,
                    // reader went away, its connection is about to close
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }

        if dropped > 0 {
            debug!(topic = %self.topic, dropped, "dropped broadcast for slow subscribers");
        }
        Ok(())
    }

    fn send(&self, payload: Bytes) -> Result<(), HubError> {
        self.ensure_open()?;

        self.mailbox.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => HubError::SlowClient,
            TrySendError::Closed(_) => HubError::MailboxClosed,
        })
    }

    fn close(&self) -> Result<(), HubError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shared.lock().remove(&self.topic, self.id);
        trace!(topic = %self.topic, subscriber = self.id, "unsubscribed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
