//! Shared key-value / pub-sub store.
//!
//! - [`Store`] the protocol consumed from the external cache service
//! - [`MemoryStore`] in-process implementation (single host, tests, demos)
//! - [`Cache`] namespaced, JSON-typed view used by the rest of the crate

mod backend;
mod cache;
mod memory;

pub use backend::{MessageStream, Store};
pub use cache::Cache;
pub use memory::MemoryStore;
