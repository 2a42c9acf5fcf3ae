use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::SettingsStore;
use crate::error::StoreError;

/// Process-local store. Every `new()` starts empty; nothing is shared
/// between instances.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.clear();
        Ok(())
    }
}
