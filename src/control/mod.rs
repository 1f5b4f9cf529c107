//! Control plane: restart/shutdown signalling, restart policy and settings.
//!
//! ## Contents
//! - [`SignalChannel`] pub/sub listeners and publishers on store channels
//! - [`RestartControl`] persisted restart flag and restart target
//! - [`Settings`] token, prefixes and descriptive values

mod restart;
mod settings;
mod signals;

pub use restart::{RestartControl, RestartTarget};
pub use settings::{FALLBACK_PREFIX, MIN_TOKEN_LEN, Settings};
pub use signals::{DEFAULT_PAYLOAD, RESTART_CHANNEL, SHUTDOWN_CHANNEL, SignalChannel};
