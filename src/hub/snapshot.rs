//! Snapshot decorator.
//!
//! [`SnapshotHub`] wraps another hub and keeps the latest broadcast payload of
//! every topic in a [`SnapshotStore`]. New subscribers get that payload pushed
//! into their own mailbox before any live traffic, so a client joining a
//! board starts from its current state instead of an empty one.
//!
//! Store failures are logged and otherwise ignored: delivery to the live
//! subscribers always goes ahead, a failed write only affects later joiners.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::hub::{Hub, Mailbox, Subscription};
use crate::persistence::{DEFAULT_KEY_PREFIX, SnapshotStore};
use crate::utils::error::{HubError, StoreError};

const GATE_STRIPES: usize = 16;

/// Upper bound for a single store call made by [`SnapshotHub`].
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Serializes snapshot delivery against broadcasts of the same topic.
///
/// Without it a subscriber registering while a broadcast is in flight could
/// receive the live payload first and a stale snapshot after it. Holders
/// await store calls, which are bounded by the hub's store timeout.
#[derive(Debug)]
struct Gates {
    stripes: [Mutex<()>; GATE_STRIPES],
}

impl Gates {
    fn new() -> Self {
        Self {
            stripes: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    async fn lock(&self, topic: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        topic.hash(&mut hasher);
        let stripe = (hasher.finish() as usize) % GATE_STRIPES;
        self.stripes[stripe].lock().await
    }
}

/// Hub decorator persisting the last payload per topic.
pub struct SnapshotHub<H> {
    hub: H,
    store: Arc<dyn SnapshotStore>,
    key_prefix: String,
    store_timeout: Duration,
    gates: Arc<Gates>,
}

impl<H: Hub> SnapshotHub<H> {
    pub fn new(hub: H, store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_key_prefix(hub, store, DEFAULT_KEY_PREFIX)
    }

    pub fn with_key_prefix(hub: H, store: Arc<dyn SnapshotStore>, key_prefix: &str) -> Self {
        Self {
            hub,
            store,
            key_prefix: key_prefix.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            gates: Arc::new(Gates::new()),
        }
    }

    /// Caps how long `subscribe` and `broadcast` wait for the store.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// The wrapped hub.
    pub fn inner(&self) -> &H {
        &self.hub
    }

    fn key(&self, topic: &str) -> String {
        format!("{}{}", self.key_prefix, topic)
    }
}

#[async_trait]
impl<H: Hub> Hub for SnapshotHub<H> {
    async fn subscribe(&self, topic: &str, mailbox: Mailbox) -> Box<dyn Subscription> {
        let key = self.key(topic);

        let sub = {
            let _gate = self.gates.lock(topic).await;
            let sub = self.hub.subscribe(topic, mailbox).await;
            let loaded = timeout(self.store_timeout, self.store.get(&key))
                .await
                .unwrap_or(Err(StoreError::Timeout(self.store_timeout)));
            match loaded {
                Ok(Some(snapshot)) => {
                    if let Err(e) = sub.send(snapshot) {
                        warn!(topic, error = %e, "cannot deliver snapshot");
                    }
                }
                Ok(None) => debug!(topic, "no snapshot yet"),
                Err(e) => warn!(topic, error = %e, "cannot load snapshot"),
            }
            sub
        };

        Box::new(SnapshotSubscription {
            key,
            sub,
            store: self.store.clone(),
            store_timeout: self.store_timeout,
            gates: self.gates.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

struct SnapshotSubscription {
    key: String,
    sub: Box<dyn Subscription>,
    store: Arc<dyn SnapshotStore>,
    store_timeout: Duration,
    gates: Arc<Gates>,
    closed: AtomicBool,
}

#[async_trait]
impl Subscription for SnapshotSubscription {
    fn topic(&self) -> &str {
        self.sub.topic()
    }

    async fn broadcast(&self, payload: Bytes) -> Result<(), HubError> {
        let _gate = self.gates.lock(self.sub.topic()).await;
        // a closed member no longer writes board state
        if self.is_closed() {
            return Err(HubError::Closed);
        }

        let stored = timeout(self.store_timeout, self.store.set(&self.key, &payload))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.store_timeout)));
        if let Err(e) = stored {
            warn!(topic = %self.sub.topic(), error = %e, "cannot store snapshot");
        }
        self.sub.broadcast(payload).await
    }

    fn send(&self, payload: Bytes) -> Result<(), HubError> {
        self.sub.send(payload)
    }

    fn close(&self) -> Result<(), HubError> {
        self.closed.store(true, Ordering::Release);
        self.sub.close()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sub.is_closed()
    }
}
