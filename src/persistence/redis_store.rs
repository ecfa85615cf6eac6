//! Snapshot store backed by Redis.
//!
//! All calls share one [`ConnectionManager`]: a multiplexed connection that
//! pipelines concurrent requests and reconnects on its own after the server
//! drops it. Connecting and every request are bounded by the store timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use tokio::time::timeout;

use crate::persistence::SnapshotStore;
use crate::utils::error::StoreError;

pub struct RedisStore {
    manager: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    /// Connects to the server at `url`, giving up after `timeout`.
    pub async fn open(url: &str, timeout_after: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let manager = timeout(timeout_after, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout_after))??;
        Ok(Self {
            manager,
            timeout: timeout_after,
        })
    }

    async fn with_redis<F, Fut, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let manager = self.manager.clone();
        match timeout(self.timeout, f(manager)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl SnapshotStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let value: Option<Vec<u8>> = self
            .with_redis(|mut conn| async move { conn.get(key).await })
            .await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.with_redis(|mut conn| async move { conn.set(key, value).await })
            .await
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .finish()
    }
}
