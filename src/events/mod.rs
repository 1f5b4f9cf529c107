//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `JobActor`, `Registry`, `Coordinator`, control-channel listeners,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor's subscriber listener (fans out to `SubscriberSet`),
//!   the registry cleanup listener and the bot's failure watcher.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
