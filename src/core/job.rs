//! # Job state and handles.
//!
//! ```text
//!             ┌──────────── interrupt (policy ok) ───────────┐
//!             ▼                                              │
//! PendingReady ──ready──► Running ──interrupt──► Interrupted ──► Resuming
//!      │                     │                       │
//!      │                     ├── Ok ───────────────► Terminated(Completed)
//!      │                     └── Fail/Fatal ───────► Failed(e)
//!      └── interrupt ──► Interrupted ──┬─ session closed ─► Terminated(SessionClosed)
//!                                      └─ policy declined ─► Terminated(PolicyDeclined)
//! any state ── cancel ──► Terminated(Cancelled)
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Why a job terminated without failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// The work returned `Ok(())`.
    Completed,
    /// The resume policy answered `false` after an interruption.
    PolicyDeclined,
    /// The session was closed while the job was interrupted or waiting.
    SessionClosed,
    /// The supervisor cancelled the job.
    Cancelled,
}

impl TerminationReason {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TerminationReason::Completed => "completed",
            TerminationReason::PolicyDeclined => "policy_declined",
            TerminationReason::SessionClosed => "session_closed",
            TerminationReason::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle state of a supervised job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for the session to become ready.
    PendingReady,
    /// The work is running.
    Running,
    /// An interruption was observed; the resume policy is being evaluated.
    Interrupted,
    /// The policy accepted; the job goes back to waiting for readiness.
    Resuming,
    /// Terminal: ended without error.
    Terminated(TerminationReason),
    /// Terminal: the work failed.
    Failed(TaskError),
}

impl JobState {
    /// True for `Terminated` and `Failed`.
    pub fn is_final(&self) -> bool {
        matches!(self, JobState::Terminated(_) | JobState::Failed(_))
    }
}

/// Handle to a supervised job.
///
/// Cheap to clone; every clone observes the same job.
#[derive(Clone, Debug)]
pub struct JobHandle {
    name: Arc<str>,
    protected: bool,
    state: watch::Receiver<JobState>,
    interrupts: Arc<watch::Sender<u64>>,
    cancel: CancellationToken,
}

impl JobHandle {
    pub(crate) fn new(
        name: Arc<str>,
        protected: bool,
        state: watch::Receiver<JobState>,
        interrupts: Arc<watch::Sender<u64>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name,
            protected,
            state,
            interrupts,
            cancel,
        }
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the job survives mass cancellation and interruption.
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Delivers an interruption. Interruptions not yet observed coalesce.
    pub fn interrupt(&self) {
        self.interrupts.send_modify(|generation| *generation += 1);
    }

    /// Requests cancellation without waiting for the job to unwind.
    ///
    /// Use [`Supervisor::cancel_all`](crate::Supervisor::cancel_all) to cancel and join.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until the state satisfies `pred` and returns that state.
    ///
    /// Returns the last known state if the job's actor is gone.
    pub async fn wait_until(&self, mut pred: impl FnMut(&JobState) -> bool) -> JobState {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|s| pred(s)).await.map(|s| (*s).clone());
        match reached {
            Ok(state) => state,
            Err(_) => rx.borrow().clone(),
        }
    }

    /// Waits for the job to end.
    ///
    /// `Ok` carries the termination reason; `Err` carries the failing error
    /// unchanged.
    pub async fn wait(&self) -> Result<TerminationReason, TaskError> {
        match self.wait_until(JobState::is_final).await {
            JobState::Terminated(reason) => Ok(reason),
            JobState::Failed(err) => Err(err),
            _ => Err(TaskError::Fatal {
                error: format!("job '{}' was aborted", self.name),
            }),
        }
    }
}
