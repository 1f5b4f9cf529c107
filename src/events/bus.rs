//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (job actors, registry,
//! coordinator, signal listeners).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Consumers:
//!   JobActor    ──┐
//!   Registry    ──┼──────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   Coordinator ──┤  (broadcast chan)   Registry cleanup listener
//!   Listeners   ──┘                     Bot failure watcher
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_events_after_subscribing() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::SessionReady));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::SessionLost));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::SessionLost);
    }
}
