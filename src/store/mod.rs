//! Persisted settings overrides. Services ask for their key and fall back to
//! the configured default when it is missing.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

pub const CONTROLLER_SETTINGS_KEY: &str = "controller.settings";
pub const LAYOUT_SETTINGS_KEY: &str = "layout.settings";
pub const RENDER_SETTINGS_KEY: &str = "render.settings";

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Drop every override.
    async fn reset(&self) -> Result<(), StoreError>;
}

/// Decode the override stored under `key`, or hand back `fallback`.
pub async fn load_or<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str, fallback: T) -> T {
    match store.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("[store] discarding undecodable {key}: {e}");
                fallback
            }
        },
        Ok(None) => {
            info!("[store] no {key} saved, using default");
            fallback
        }
        Err(e) => {
            warn!("[store] couldn't read {key}, using default: {e}");
            fallback
        }
    }
}

pub async fn save<T: Serialize>(store: &dyn SettingsStore, key: &str, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}
