//! Snapshot store backed by `sled`.
//!
//! Every snapshot lives in the default tree under its full key. sled flushes
//! in the background, so snapshots survive a restart of the process. Reads
//! and writes may touch the disk, so they run on the blocking pool.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use sled::Db;
use tokio::task;

use crate::persistence::SnapshotStore;
use crate::utils::error::StoreError;

#[derive(Clone)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Blocks until every pending write reached disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let db = self.db.clone();
        let key = key.to_string();
        let value = task::spawn_blocking(move || db.get(key.as_bytes())).await??;
        Ok(value.map(|v| Bytes::copy_from_slice(&v)))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let db = self.db.clone();
        let key = key.to_string();
        let value = value.to_vec();
        task::spawn_blocking(move || db.insert(key.as_bytes(), value)).await??;
        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
