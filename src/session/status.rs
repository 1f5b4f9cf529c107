//! # Connection session state.
//!
//! One [`Session`] exists per process instance. The coordinator owns it and drives
//! its transitions; jobs observe it through a read-only [`SessionWatch`].
//!
//! ```text
//! Connecting ──ready()──► Ready ──connection lost──► Connecting ──► ...
//!      │                    │
//!      └───── close() ──────┴──► Closed   (terminal)
//! ```
//!
//! `Closed` is terminal: once closed, later `mark_ready`/`mark_connecting` calls are
//! ignored.

use tokio::sync::watch;

/// Observable status of the gateway session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    /// Logging in, handshaking, or waiting to reconnect.
    Connecting,
    /// The handshake finished; jobs may run.
    Ready,
    /// The session ended for good.
    Closed,
}

impl SessionStatus {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionStatus::Connecting => "connecting",
            SessionStatus::Ready => "ready",
            SessionStatus::Closed => "closed",
        }
    }
}

/// Writable side of the session status, owned by the coordinator.
#[derive(Debug)]
pub struct Session {
    tx: watch::Sender<SessionStatus>,
}

impl Session {
    /// Creates a session in the `Connecting` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionStatus::Connecting);
        Self { tx }
    }

    /// Returns a read-only view for jobs.
    pub fn watch(&self) -> SessionWatch {
        SessionWatch {
            rx: self.tx.subscribe(),
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.tx.borrow()
    }

    /// Marks the session ready. Returns `true` if the status changed.
    pub fn mark_ready(&self) -> bool {
        self.transition(SessionStatus::Ready)
    }

    /// Marks the session as reconnecting. Returns `true` if the status changed.
    pub fn mark_connecting(&self) -> bool {
        self.transition(SessionStatus::Connecting)
    }

    /// Closes the session permanently. Returns `true` if it was not closed yet.
    pub fn close(&self) -> bool {
        self.transition(SessionStatus::Closed)
    }

    fn transition(&self, next: SessionStatus) -> bool {
        self.tx.send_if_modified(|status| {
            if *status == SessionStatus::Closed || *status == next {
                return false;
            }
            *status = next;
            true
        })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view over a [`Session`].
#[derive(Clone, Debug)]
pub struct SessionWatch {
    rx: watch::Receiver<SessionStatus>,
}

impl SessionWatch {
    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.rx.borrow()
    }

    /// True while the session is ready.
    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    /// True once the session is closed (or its owner is gone).
    pub fn is_closed(&self) -> bool {
        self.status() == SessionStatus::Closed || self.rx.has_changed().is_err()
    }

    /// Waits until the session is ready.
    ///
    /// Returns `false` if the session was closed (or dropped) first.
    pub async fn wait_ready(&mut self) -> bool {
        match self.rx.wait_for(|s| *s != SessionStatus::Connecting).await {
            Ok(status) => *status == SessionStatus::Ready,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_ready_releases_on_ready() {
        let session = Session::new();
        let mut watch = session.watch();
        assert!(!watch.is_ready());

        let waiter = tokio::spawn(async move { watch.wait_ready().await });
        tokio::task::yield_now().await;
        assert!(session.mark_ready());
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let session = Session::new();
        let mut watch = session.watch();

        assert!(session.close());
        assert!(!session.mark_ready());
        assert!(!session.mark_connecting());
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(!watch.wait_ready().await);
        assert!(watch.is_closed());
    }

    #[tokio::test]
    async fn dropped_session_reads_as_closed() {
        let session = Session::new();
        let mut watch = session.watch();
        drop(session);

        assert!(watch.is_closed());
        assert!(!watch.wait_ready().await);
    }
}
