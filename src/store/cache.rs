//! # Namespaced, typed view over a [`Store`].
//!
//! [`Cache`] keeps the core's keys apart from extension-contributed keys:
//!
//! ```text
//! core       key "token"        → "dwarf_token"
//! extension  key "last_seen"    → "dwarf_reminders_last_seen"
//! core       channel "restart"  → "dwarf:channel:restart"
//! extension  channel "tick"     → "dwarf:channel:reminders_tick"
//! ```
//!
//! Values are stored as JSON, so anything `Serialize + DeserializeOwned` round-trips.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::StoreError;
use crate::store::backend::{MessageStream, Store};

/// Handle to the shared store scoped to the application (and optionally one extension).
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn Store>,
    prefix: Arc<str>,
    extension: Option<Arc<str>>,
}

impl Cache {
    /// Creates a core-scoped cache. An empty `prefix` disables key prefixing.
    pub fn new(store: Arc<dyn Store>, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            extension: None,
        }
    }

    /// Returns a cache scoped to `extension`'s own storage area.
    pub fn for_extension(&self, extension: impl Into<Arc<str>>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: Arc::clone(&self.prefix),
            extension: Some(extension.into()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Fully qualified key for `key`.
    pub fn key(&self, key: &str) -> String {
        let scoped = match &self.extension {
            Some(ext) => format!("{ext}_{key}"),
            None => key.to_string(),
        };
        if self.prefix.is_empty() {
            scoped
        } else {
            format!("{}_{scoped}", self.prefix)
        }
    }

    /// Fully qualified pub/sub channel for `name`.
    pub fn channel(&self, name: &str) -> String {
        let scoped = match &self.extension {
            Some(ext) => format!("channel:{ext}_{name}"),
            None => format!("channel:{name}"),
        };
        if self.prefix.is_empty() {
            scoped
        } else {
            format!("{}:{scoped}", self.prefix)
        }
    }

    /// Reads and decodes `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(&self.key(key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Reads `key`, falling back to `default` when absent.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, StoreError> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Encodes and stores `value` under `key`.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(&self.key(key), raw, ttl).await
    }

    /// Reads several keys; absent keys are left out of the result.
    pub async fn get_many<T: DeserializeOwned>(
        &self,
        keys: &[&str],
    ) -> Result<HashMap<String, T>, StoreError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    /// Stores several key/value pairs with the same TTL.
    pub async fn set_many<T: Serialize>(
        &self,
        entries: &[(&str, T)],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value, ttl).await?;
        }
        Ok(())
    }

    /// Deletes `key`.
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.store.delete(&self.key(key)).await
    }

    /// Publishes `payload` on channel `name`.
    pub async fn publish(&self, name: &str, payload: &str) -> Result<usize, StoreError> {
        self.store
            .publish(&self.channel(name), payload.to_string())
            .await
    }

    /// Subscribes to channel `name`.
    pub async fn subscribe(&self, name: &str) -> Result<MessageStream, StoreError> {
        self.store.subscribe(&self.channel(name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures::StreamExt;

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryStore::new()), "dwarf")
    }

    #[test]
    fn keys_and_channels_are_namespaced() {
        let core = cache();
        let ext = core.for_extension("reminders");

        assert_eq!(core.key("token"), "dwarf_token");
        assert_eq!(ext.key("last_seen"), "dwarf_reminders_last_seen");
        assert_eq!(core.channel("restart"), "dwarf:channel:restart");
        assert_eq!(ext.channel("tick"), "dwarf:channel:reminders_tick");

        let bare = Cache::new(Arc::new(MemoryStore::new()), "");
        assert_eq!(bare.key("token"), "token");
        assert_eq!(bare.channel("shutdown"), "channel:shutdown");
    }

    #[tokio::test]
    async fn extension_keys_do_not_collide_with_core_keys() {
        let core = cache();
        let ext = core.for_extension("music");

        core.set("volume", &10u8, None).await.unwrap();
        ext.set("volume", &70u8, None).await.unwrap();

        assert_eq!(core.get::<u8>("volume").await.unwrap(), Some(10));
        assert_eq!(ext.get::<u8>("volume").await.unwrap(), Some(70));
    }

    #[tokio::test]
    async fn typed_values_and_batches() {
        let c = cache();
        c.set("prefixes", &vec!["!", "?"], None).await.unwrap();
        assert_eq!(
            c.get::<Vec<String>>("prefixes").await.unwrap(),
            Some(vec!["!".to_string(), "?".to_string()])
        );
        assert!(!c.get_or("missing", false).await.unwrap());

        c.set_many(&[("a", 1u32), ("b", 2u32)], None).await.unwrap();
        let many: HashMap<String, u32> = c.get_many(&["a", "b", "c"]).await.unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many["b"], 2);
    }

    #[tokio::test]
    async fn malformed_values_surface_as_codec_errors() {
        let c = cache();
        c.store()
            .set("dwarf_owner", "not json".into(), None)
            .await
            .unwrap();
        let err = c.get::<u64>("owner").await.unwrap_err();
        assert_eq!(err.as_label(), "store_codec");
    }

    #[tokio::test]
    async fn publish_uses_the_namespaced_channel() {
        let c = cache();
        let mut sub = c.store().subscribe("dwarf:channel:restart").await.unwrap();
        assert_eq!(c.publish("restart", "1").await.unwrap(), 1);
        assert_eq!(sub.next().await.unwrap().unwrap(), "1");
    }
}
