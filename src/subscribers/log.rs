//! # LogWriter: renders runtime events as `tracing` records.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  botvisor: job starting task="reminders" attempt=1
//! WARN  botvisor: job interrupted task="reminders" reason="session lost"
//! INFO  botvisor: reconnect scheduled attempt=2 delay_ms=400
//! ERROR botvisor: job failed task="poller" reason="execution failed: boom"
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::JobRegistered => {
                tracing::debug!(task, reason, "job registered");
            }
            EventKind::JobWaitingReady => {
                tracing::debug!(task, "job waiting for session");
            }
            EventKind::JobStarting => {
                tracing::info!(task, attempt = e.attempt, "job starting");
            }
            EventKind::JobInterrupted => {
                tracing::warn!(task, reason, attempt = e.attempt, "job interrupted");
            }
            EventKind::JobResuming => {
                tracing::info!(task, delay_ms = e.delay_ms, "job resuming");
            }
            EventKind::JobTerminated => {
                tracing::info!(task, reason, "job terminated");
            }
            EventKind::JobFailed => {
                tracing::error!(task, reason, attempt = e.attempt, "job failed");
            }
            EventKind::JobRemoved => {
                tracing::debug!(task, "job removed");
            }
            EventKind::SessionReady => {
                tracing::info!("session ready");
            }
            EventKind::SessionLost => {
                tracing::warn!(reason, "session lost");
            }
            EventKind::ReconnectScheduled => {
                tracing::info!(attempt = e.attempt, delay_ms = e.delay_ms, reason, "reconnect scheduled");
            }
            EventKind::SessionClosed => {
                tracing::info!("session closed");
            }
            EventKind::SignalReceived => {
                tracing::info!(channel = task, payload = reason, "control message received");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(reason, "stop requested");
            }
            EventKind::AllStoppedWithin => {
                tracing::info!("all jobs stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::warn!("grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = task, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(subscriber = task, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
