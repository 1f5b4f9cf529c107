//! # Event subscribers for the botvisor runtime.
//!
//! ```text
//!   JobActor ── publish(Event) ──► Bus ──► supervisor forwarder ──► SubscriberSet
//!                                                                  ├──► LogWriter (tracing)
//!                                                                  └──► custom subscribers
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use botvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct Reconnects;
//!
//! #[async_trait]
//! impl Subscribe for Reconnects {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::ReconnectScheduled {
//!             // bump a counter
//!         }
//!     }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
