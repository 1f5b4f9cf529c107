//! # In-process [`Store`] implementation.
//!
//! Values live in a `HashMap` with lazy TTL expiry (checked on read, measured with
//! `tokio::time::Instant` so paused test clocks apply). Channels are
//! `tokio::sync::broadcast` senders created on first subscribe.
//!
//! [`MemoryStore::drop_subscriptions`] simulates the backend dropping every pub/sub
//! connection, which is how tests exercise listener resubscription.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;

use crate::error::StoreError;
use crate::store::backend::{MessageStream, Store};

struct Entry {
    value: String,
    expires: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|at| at > now)
    }
}

/// Shared store kept in process memory.
pub struct MemoryStore {
    values: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    channel_capacity: usize,
}

impl MemoryStore {
    /// Creates an empty store; each channel buffers up to 64 undelivered messages.
    pub fn new() -> Self {
        Self::with_channel_capacity(64)
    }

    /// Creates an empty store with the given per-channel buffer.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            channel_capacity: capacity.max(1),
        }
    }

    /// Ends every open subscription stream, as if the backend connection dropped.
    pub async fn drop_subscriptions(&self) {
        self.channels.lock().await.clear();
    }

    /// Number of live subscribers on `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut values = self.values.lock().await;
        let now = Instant::now();
        match values.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.values
            .lock()
            .await
            .insert(key.to_string(), Entry { value, expires });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.values.lock().await.remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(Instant::now())))
    }

    async fn publish(&self, channel: &str, message: String) -> Result<usize, StoreError> {
        let channels = self.channels.lock().await;
        match channels.get(channel) {
            Some(tx) => Ok(tx.send(message).unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError> {
        let rx = {
            let mut channels = self.channels.lock().await;
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
                .subscribe()
        };
        let channel = channel.to_string();

        let stream = futures::stream::unfold(rx, move |mut rx| {
            let channel = channel.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(msg) => return Some((Ok(msg), rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(%channel, skipped, "subscriber lagged; messages skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_round_trip_and_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v".into(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_values() {
        let store = MemoryStore::new();
        store
            .set("session", "abc".into(), Some(Duration::from_secs(5)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.get("session").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_reaches_only_current_subscribers() {
        let store = MemoryStore::new();
        assert_eq!(store.publish("ch", "lost".into()).await.unwrap(), 0);

        let mut sub = store.subscribe("ch").await.unwrap();
        assert_eq!(store.publish("ch", "hello".into()).await.unwrap(), 1);
        assert_eq!(sub.next().await.unwrap().unwrap(), "hello");

        drop(sub);
        assert_eq!(store.publish("ch", "gone".into()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_subscriptions_end_the_stream() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("ch").await.unwrap();
        assert_eq!(store.subscriber_count("ch").await, 1);

        store.drop_subscriptions().await;
        assert!(sub.next().await.is_none());
    }
}
