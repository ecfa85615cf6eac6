use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::persistence::SnapshotStore;
use crate::utils::error::StoreError;

/// Snapshot store kept in process memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    mem: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mem.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mem = self.mem.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(mem.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut mem = self.mem.lock().unwrap_or_else(PoisonError::into_inner);
        mem.insert(key.to_string(), Bytes::copy_from_slice(value));
        Ok(())
    }
}
