//! The `persistence` module stores the latest payload of every topic.
//!
//! The snapshot layer only needs get/set of an opaque byte blob by key, which
//! [`SnapshotStore`] captures. Three backends are provided:
//!
//! - `sled_store`: embedded and durable, the default.
//! - `redis_store`: external Redis server over a shared multiplexed
//!   connection.
//! - `memory_store`: process memory, for tests and throwaway deployments.

pub mod memory_store;
pub mod redis_store;
pub mod sled_store;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::config::{SnapshotBackend, SnapshotSettings};
use crate::utils::error::StoreError;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
pub use sled_store::SledStore;

/// Prefix of the key a topic's snapshot is stored under.
pub const DEFAULT_KEY_PREFIX: &str = "board:snapshot:";

/// Key/value store holding one snapshot per key.
///
/// Implementations must not block the calling runtime thread; blocking
/// backends hand their work to the blocking pool.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns `None` when nothing was stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Opens the store selected by `settings`, or `None` when snapshots are
/// disabled.
pub async fn open_store(
    settings: &SnapshotSettings,
) -> Result<Option<Arc<dyn SnapshotStore>>, StoreError> {
    let store: Arc<dyn SnapshotStore> = match settings.backend {
        SnapshotBackend::Disabled => {
            info!("snapshots disabled");
            return Ok(None);
        }
        SnapshotBackend::Memory => {
            info!("keeping snapshots in memory");
            Arc::new(MemoryStore::new())
        }
        SnapshotBackend::Sled => {
            info!(path = %settings.path, "opening sled snapshot store");
            Arc::new(SledStore::open(&settings.path)?)
        }
        SnapshotBackend::Redis => {
            info!(url = %settings.redis_url, "using redis snapshot store");
            Arc::new(RedisStore::open(&settings.redis_url, settings.timeout()).await?)
        }
    };
    Ok(Some(store))
}
