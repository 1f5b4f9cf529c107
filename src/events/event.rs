//! # Runtime events emitted by the supervisor, job actors and the coordinator.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Job lifecycle**: waiting, starting, interrupted, resuming, terminated, failed
//! - **Registry**: registered / removed
//! - **Session**: ready, lost, closed, reconnect scheduled
//! - **Control plane**: restart/shutdown messages, drain outcome
//!
//! The [`Event`] struct carries additional metadata such as timestamps, job name,
//! reasons, and reconnect delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use botvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::JobInterrupted)
//!     .with_task("reminders")
//!     .with_reason("session lost")
//!     .with_attempt(3);
//!
//! assert_eq!(ev.kind, EventKind::JobInterrupted);
//! assert_eq!(ev.task.as_deref(), Some("reminders"));
//! assert_eq!(ev.reason.as_deref(), Some("session lost"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Job lifecycle ===
    /// Job added to the registry.
    ///
    /// Sets: `task`, `reason` (`"protected"` for protected jobs).
    JobRegistered,

    /// Job is waiting for the session to become ready.
    ///
    /// Sets: `task`.
    JobWaitingReady,

    /// Job is starting a run.
    ///
    /// Sets: `task`, `attempt` (1-based, per job).
    JobStarting,

    /// Job was interrupted (connection loss or interruption raised by the job).
    ///
    /// Sets: `task`, `reason`, `attempt` (absent if it never ran).
    JobInterrupted,

    /// Resume policy accepted; the job waits for readiness again.
    ///
    /// Sets: `task`.
    JobResuming,

    /// Job terminated (completed, declined, session closed or cancelled).
    ///
    /// Sets: `task`, `reason` (termination label).
    JobTerminated,

    /// Job failed with a non-interruption error.
    ///
    /// Sets: `task`, `attempt`, `reason` (error message).
    JobFailed,

    /// Job removed from the registry (after join/cleanup).
    ///
    /// Sets: `task`.
    JobRemoved,

    // === Session ===
    /// The gateway finished its handshake.
    SessionReady,

    /// The gateway connection dropped; jobs are being interrupted.
    ///
    /// Sets: `reason`.
    SessionLost,

    /// Reconnect scheduled.
    ///
    /// Sets: `attempt`, `delay_ms`, `reason` (last error).
    ReconnectScheduled,

    /// The session was closed permanently.
    SessionClosed,

    // === Control plane ===
    /// A message arrived on a control channel.
    ///
    /// Sets: `task` (channel name), `reason` (payload).
    SignalReceived,

    /// Stop requested.
    ///
    /// Sets: `reason` (stop reason label).
    ShutdownRequested,

    /// All jobs stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some jobs did not stop in time.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Reconnect delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Name of the job (or channel/subscriber), if applicable.
    pub task: Option<Arc<str>>,
    /// Event classification.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            kind,
            at: SystemTime::now(),
            attempt: None,
            reason: None,
            delay_ms: None,
            task: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a job name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// Delay as a [`Duration`], if set.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::JobStarting);
        let b = Event::new(EventKind::JobStarting);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_is_clamped_to_u32_millis() {
        let ev = Event::new(EventKind::ReconnectScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
        assert_eq!(
            Event::new(EventKind::ReconnectScheduled)
                .with_delay(Duration::from_millis(250))
                .delay(),
            Some(Duration::from_millis(250))
        );
    }
}
