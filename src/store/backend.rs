//! # Shared key-value / pub-sub store contract.
//!
//! The runtime consumes a remote cache that offers plain string values with an
//! optional TTL and fire-and-forget pub/sub over named channels. Anything that
//! speaks this protocol (an in-process map, a Redis connection, ...) can be
//! plugged in through [`Store`].
//!
//! ## Contract
//! - `publish` returns how many subscribers received the message; messages are
//!   **not** queued for absent subscribers.
//! - A [`MessageStream`] ends (`None`) when the subscription is dropped by the
//!   backend; an `Err` item reports a backend failure.
//! - Atomicity of single-key `get`/`set`/`delete` is the store's job; callers hold
//!   no in-process locks around them.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;

/// Messages delivered on one subscription.
pub type MessageStream = BoxStream<'static, Result<String, StoreError>>;

/// Remote key-value cache with pub/sub.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`; `ttl = None` keeps it forever.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Removes `key`. Returns `true` if something was deleted.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Publishes `message` on `channel`; returns the number of receivers.
    async fn publish(&self, channel: &str, message: String) -> Result<usize, StoreError>;

    /// Subscribes to `channel`. Dropping the stream unsubscribes.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError>;
}
