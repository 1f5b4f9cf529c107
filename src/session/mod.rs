//! Gateway session: status watch and the chat-client contract.
//!
//! - [`Session`] / [`SessionWatch`] the per-process connection status
//! - [`Gateway`] the external chat client
//! - [`SessionLink`] what a running connection uses to report readiness

mod gateway;
mod status;

pub use gateway::{Gateway, SessionLink};
pub use status::{Session, SessionStatus, SessionWatch};
