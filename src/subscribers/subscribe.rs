//! # Subscriber trait
//!
//! `Subscribe` receives every runtime event: job transitions, session changes
//! (ready, lost, reconnect scheduled, closed) and control messages. Each
//! subscriber gets its own worker and bounded queue inside
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! A slow subscriber never delays jobs or the coordinator. When its queue is full
//! the event is dropped for that subscriber only and `SubscriberOverflow` is
//! published.

use crate::events::Event;
use async_trait::async_trait;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Called once per event, in publish order.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity; events beyond it are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
