//! # Chat gateway contract.
//!
//! The chat protocol client lives outside this crate. The coordinator drives it
//! through [`Gateway`]:
//!
//! ```text
//! Coordinator::start(token)
//!   ├─► gateway.login(token)
//!   └─► loop {
//!         gateway.run(SessionLink) ──► link.ready() after handshake
//!            ├─ Ok(())                     → session ended (or stop requested)
//!            ├─ Err(connection-class)      → interrupt jobs, back off, run again
//!            └─ Err(other)                 → fatal
//!       }
//! drain: gateway.close()
//!
//! startup job (session ready): gateway.owner_id() ─► Settings::set_owner_id
//! ```
//!
//! `run` must return `Ok(())` soon after [`SessionLink::stopping`] completes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::control::RestartTarget;
use crate::error::GatewayError;
use crate::events::{Bus, Event, EventKind};
use crate::session::status::Session;

/// External chat client driven by the coordinator.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Authenticates with `token`.
    ///
    /// A refused token must be reported as [`GatewayError::InvalidCredentials`].
    async fn login(&self, token: &str) -> Result<(), GatewayError>;

    /// Runs one connection until it drops or the link reports stopping.
    async fn run(&self, link: SessionLink) -> Result<(), GatewayError>;

    /// Sends a text message to a channel.
    async fn send_message(&self, target: RestartTarget, content: &str) -> Result<(), GatewayError>;

    /// Releases the connection. Called once during the drain sequence.
    async fn close(&self);

    /// Id of the account that owns the bot application, if the platform has one.
    async fn owner_id(&self) -> Result<Option<u64>, GatewayError> {
        Ok(None)
    }
}

/// Handle given to [`Gateway::run`] for one connection attempt.
#[derive(Clone)]
pub struct SessionLink {
    session: Arc<Session>,
    stop: CancellationToken,
    bus: Bus,
    reached_ready: Arc<AtomicBool>,
}

impl SessionLink {
    pub(crate) fn new(session: Arc<Session>, stop: CancellationToken, bus: Bus) -> Self {
        Self {
            session,
            stop,
            bus,
            reached_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reports a finished handshake; releases jobs waiting for readiness.
    pub fn ready(&self) {
        self.reached_ready.store(true, Ordering::Release);
        if self.session.mark_ready() {
            self.bus.publish(Event::new(EventKind::SessionReady));
        }
    }

    /// Completes when the coordinator wants the connection to end.
    pub fn stopping(&self) -> WaitForCancellationFuture<'_> {
        self.stop.cancelled()
    }

    /// True once the coordinator wants the connection to end.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Whether [`SessionLink::ready`] was called during this connection.
    pub(crate) fn reached_ready(&self) -> bool {
        self.reached_ready.load(Ordering::Acquire)
    }
}
