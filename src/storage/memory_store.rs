//! In-memory [`KeyValueStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::KeyValueStore;
use crate::error::Result;

/// Process-local storage backed by a `HashMap`
///
/// Nothing survives the process. Used by tests and by callers that manage
/// persistence themselves.
#[derive(Default)]
pub struct MemoryStore {
    memory: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.memory.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.memory.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.memory.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.memory.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<String> {
        let mut storage = self.memory.write();
        Ok(storage
            .entry(key.to_string())
            .or_insert_with(|| value.to_string())
            .clone())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.memory.write().remove(key).is_some())
    }
}
