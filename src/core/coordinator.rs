//! # Coordinator: connection lifecycle of one process instance.
//!
//! Owns the [`Session`], drives the [`Gateway`], and turns connection loss into
//! job interruptions.
//!
//! ```text
//! start(token)
//!   ├─► gateway.login(token)            refused → disable restarting, InvalidCredentials
//!   └─► loop
//!         gateway.run(SessionLink)
//!           ├─ stop requested            → drain
//!           ├─ Ok(())                    → stop(SessionEnded), drain
//!           ├─ Err(connection-class)     → session Connecting
//!           │                              SessionLost, interrupt_unprotected()
//!           │                              ReconnectScheduled, sleep(backoff), run again
//!           └─ Err(other)                → disable restarting, drain, Err
//!
//! drain
//!   cancel_unprotected() → session.close() → gateway.close() → supervisor.shutdown()
//! ```
//!
//! The reconnect counter resets after a connection that reached `Ready`.
//! [`StopHandle::stop`] never blocks, so jobs under supervision may call it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::control::RestartControl;
use crate::core::config::Config;
use crate::core::shutdown::termination_signal;
use crate::core::supervisor::Supervisor;
use crate::error::{GatewayError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::session::{Gateway, Session, SessionLink};

/// Why the coordinator stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// A shutdown message was received.
    Shutdown,
    /// A restart message was received.
    Restart,
    /// The process received an OS termination signal.
    Signal,
    /// The gateway ended the session on its own.
    SessionEnded,
    /// A core job failed.
    JobFailed,
}

impl StopReason {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StopReason::Shutdown => "shutdown",
            StopReason::Restart => "restart",
            StopReason::Signal => "signal",
            StopReason::SessionEnded => "session_ended",
            StopReason::JobFailed => "job_failed",
        }
    }
}

/// Cloneable, non-blocking trigger for stopping the coordinator.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl StopHandle {
    /// Requests a stop. Only the first reason is kept.
    pub fn stop(&self, reason: StopReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!(reason = reason.as_label(), "stop requested");
        }
        self.token.cancel();
    }

    /// True once a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The first recorded stop reason.
    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    /// Completes once a stop was requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Connection lifecycle coordinator.
pub struct Coordinator {
    supervisor: Arc<Supervisor>,
    gateway: Arc<dyn Gateway>,
    session: Arc<Session>,
    restart: RestartControl,
    stop: StopHandle,
    started: AtomicBool,
}

impl Coordinator {
    /// Creates a coordinator. `session` must be the one `supervisor` watches.
    pub fn new(
        supervisor: Arc<Supervisor>,
        gateway: Arc<dyn Gateway>,
        session: Arc<Session>,
        restart: RestartControl,
    ) -> Self {
        Self {
            supervisor,
            gateway,
            session,
            restart,
            stop: StopHandle::default(),
            started: AtomicBool::new(false),
        }
    }

    /// A handle that can stop this coordinator from anywhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Requests a stop; see [`StopHandle::stop`].
    pub fn stop(&self, reason: StopReason) {
        self.stop.stop(reason);
    }

    /// Runs the session until a stop, then drains every job.
    ///
    /// One-shot: a second call fails with [`RuntimeError::AlreadyStarted`].
    pub async fn start(&self, token: &str) -> Result<StopReason, RuntimeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }

        let watcher = self
            .cfg()
            .handle_os_signals
            .then(|| self.spawn_signal_watcher());
        let outcome = self.drive(token).await;
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        let drained = self.drain().await;

        match outcome {
            Ok(()) => {
                drained?;
                Ok(self.stop.reason().unwrap_or(StopReason::Shutdown))
            }
            Err(err) => {
                if let Err(drain_err) = drained {
                    tracing::warn!(error = %drain_err, "drain after gateway failure incomplete");
                }
                Err(err)
            }
        }
    }

    async fn drive(&self, token: &str) -> Result<(), RuntimeError> {
        let login = tokio::select! {
            res = self.gateway.login(token) => res,
            _ = self.stop.stopped() => return Ok(()),
        };
        if let Err(err) = login {
            return Err(self.fatal(err).await);
        }

        let mut failures: u32 = 0;
        loop {
            let link = SessionLink::new(
                Arc::clone(&self.session),
                self.stop.token().clone(),
                self.bus().clone(),
            );
            let res = tokio::select! {
                res = self.gateway.run(link.clone()) => res,
                _ = self.stop.stopped() => Ok(()),
            };
            if self.stop.is_stopped() {
                return Ok(());
            }

            match res {
                Ok(()) => {
                    self.stop.stop(StopReason::SessionEnded);
                    return Ok(());
                }
                Err(err) if err.is_connection() => {
                    if link.reached_ready() {
                        failures = 0;
                    }
                    self.session.mark_connecting();
                    self.bus()
                        .publish(Event::new(EventKind::SessionLost).with_reason(err.to_string()));
                    self.supervisor.interrupt_unprotected().await;

                    let delay = self.cfg().reconnect.next(failures);
                    failures = failures.saturating_add(1);
                    self.bus().publish(
                        Event::new(EventKind::ReconnectScheduled)
                            .with_attempt(failures)
                            .with_delay(delay)
                            .with_reason(err.as_label()),
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.stop.stopped() => return Ok(()),
                    }
                }
                Err(err) => return Err(self.fatal(err).await),
            }
        }
    }

    /// Disables restarting and maps a non-retryable gateway error.
    async fn fatal(&self, err: GatewayError) -> RuntimeError {
        tracing::error!(error = %err, "gateway failed; restarting disabled");
        if let Err(store_err) = self.restart.disable_restarting().await {
            tracing::warn!(error = %store_err, "cannot persist restart flag");
        }
        match err {
            GatewayError::InvalidCredentials => RuntimeError::InvalidCredentials,
            other => RuntimeError::Gateway(other),
        }
    }

    async fn drain(&self) -> Result<(), RuntimeError> {
        let reason = self.stop.reason().map_or("error", |r| r.as_label());
        self.stop.token().cancel();
        self.bus()
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(reason));

        self.supervisor.cancel_unprotected().await;
        if self.session.close() {
            self.bus().publish(Event::new(EventKind::SessionClosed));
        }
        self.gateway.close().await;
        self.supervisor.shutdown().await
    }

    fn spawn_signal_watcher(&self) -> JoinHandle<()> {
        let stop = self.stop.clone();
        let restart = self.restart.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.stopped() => {}
                res = termination_signal() => match res {
                    Ok(signal) => {
                        tracing::info!(signal, "termination signal received");
                        if let Err(err) = restart.disable_restarting().await {
                            tracing::warn!(error = %err, "cannot persist restart flag");
                        }
                        stop.stop(StopReason::Signal);
                    }
                    Err(err) => tracing::warn!(error = %err, "cannot install signal handlers"),
                }
            }
        })
    }

    fn cfg(&self) -> &Config {
        self.supervisor.config()
    }

    fn bus(&self) -> &Bus {
        self.supervisor.bus()
    }
}
