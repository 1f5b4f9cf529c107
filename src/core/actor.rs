//! # JobActor: single-job supervisor.
//!
//! Supervises one [`Task`](crate::Task) across session readiness, interruptions
//! and cancellation.
//!
//! ## Event flow
//! ```text
//! JobWaitingReady ─► [session ready] ─► JobStarting ─► [work]
//!        │                                              ├─ Ok        → JobTerminated(completed)
//!        │                                              ├─ Fail/Fatal → JobFailed
//!        │                                              └─ interrupt  → JobInterrupted
//!        └─ interrupt ─► JobInterrupted                                    │
//!                              │                                           │
//!                              ├─ session closed  → JobTerminated(session_closed)
//!                              ├─ policy declined → JobTerminated(policy_declined)
//!                              └─ policy accepted → JobResuming → JobWaitingReady ...
//! ```
//!
//! ## Rules
//! - Runs are **sequential** within one actor (never parallel).
//! - Interruptions are a generation counter: several interruptions delivered before
//!   the actor observes them cause **one** resume.
//! - Each run gets a child token of the job's lifetime token. On interruption or
//!   cancellation the child is cancelled and the work future is awaited for up to
//!   `unwind_grace`, then dropped.
//! - A job that interrupts itself (returns `TaskError::Interrupted`) is resumed
//!   after `resume_backoff.next(n)`, where `n` counts consecutive self-raised
//!   interruptions. An interruption delivered by the session, or a run that lasted
//!   at least `resume_backoff.max`, resets `n`.
//!   `JobResuming` carries the delay.
//! - The final state is written **before** the terminal event is published, so
//!   listeners reacting to the event see a final state.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::job::{JobState, TerminationReason};
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::session::SessionWatch;
use crate::tasks::JobSpec;

/// Configuration parameters for a job actor.
#[derive(Clone, Copy, Debug)]
pub(crate) struct JobActorParams {
    /// How long an interrupted or cancelled run may take to unwind (`None` = drop at once).
    pub unwind_grace: Option<Duration>,
    /// Delay policy between consecutive self-raised interruptions.
    pub resume_backoff: BackoffPolicy,
}

/// Who raised an interruption.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Source {
    Session,
    Job,
}

/// Outcome of one run of the work.
enum RunEnd {
    Finished(JobState),
    Interrupted(Source, String),
}

/// What ended a run before its result was inspected.
enum Ended {
    Cancelled,
    Interrupted,
    Returned(Result<Result<(), TaskError>, Box<dyn Any + Send>>),
}

/// What ended the wait for readiness.
enum Wake {
    Ready,
    Closed,
    Interrupted,
    Cancelled,
}

/// Drives one job from registration to its final state.
pub(crate) struct JobActor {
    name: Arc<str>,
    spec: JobSpec,
    params: JobActorParams,
    bus: Bus,
    session: SessionWatch,
    state: watch::Sender<JobState>,
    interrupts: watch::Receiver<u64>,
    attempt: u32,
    self_interrupts: u32,
    last_run: Duration,
}

impl JobActor {
    pub(crate) fn new(
        spec: JobSpec,
        params: JobActorParams,
        bus: Bus,
        session: SessionWatch,
        state: watch::Sender<JobState>,
        interrupts: watch::Receiver<u64>,
    ) -> Self {
        Self {
            name: Arc::from(spec.name()),
            spec,
            params,
            bus,
            session,
            state,
            interrupts,
            attempt: 0,
            self_interrupts: 0,
            last_run: Duration::ZERO,
        }
    }

    /// Runs the actor until the job reaches a final state.
    pub(crate) async fn run(mut self, lifetime: CancellationToken) {
        let outcome = self.supervise(&lifetime).await;
        self.finish(outcome);
    }

    async fn supervise(&mut self, lifetime: &CancellationToken) -> JobState {
        loop {
            self.set_state(JobState::PendingReady);
            self.publish(Event::new(EventKind::JobWaitingReady));

            let wake = tokio::select! {
                biased;
                _ = lifetime.cancelled() => Wake::Cancelled,
                _ = next_interrupt(&mut self.interrupts) => Wake::Interrupted,
                ready = self.session.wait_ready() => {
                    if ready { Wake::Ready } else { Wake::Closed }
                }
            };

            let (source, reason) = match wake {
                Wake::Cancelled => return JobState::Terminated(TerminationReason::Cancelled),
                Wake::Closed => return JobState::Terminated(TerminationReason::SessionClosed),
                Wake::Interrupted => (
                    Source::Session,
                    "interrupted while waiting for session".to_string(),
                ),
                Wake::Ready => match self.run_once(lifetime).await {
                    RunEnd::Finished(state) => return state,
                    RunEnd::Interrupted(source, reason) => (source, reason),
                },
            };

            self.set_state(JobState::Interrupted);
            let mut ev = Event::new(EventKind::JobInterrupted).with_reason(reason);
            if self.attempt > 0 {
                ev = ev.with_attempt(self.attempt);
            }
            self.publish(ev);

            if let Some(end) = self.decide(lifetime).await {
                return end;
            }
            self.set_state(JobState::Resuming);

            let delay = self.resume_delay(source);
            let mut ev = Event::new(EventKind::JobResuming);
            if let Some(delay) = delay {
                ev = ev.with_delay(delay);
            }
            self.publish(ev);

            if let Some(delay) = delay {
                tokio::select! {
                    biased;
                    _ = lifetime.cancelled() => {
                        return JobState::Terminated(TerminationReason::Cancelled);
                    }
                    _ = time::sleep(delay) => {}
                }
            }
        }
    }

    /// Backoff before the next run; `None` when the session raised the interruption.
    fn resume_delay(&mut self, source: Source) -> Option<Duration> {
        match source {
            Source::Session => {
                self.self_interrupts = 0;
                None
            }
            Source::Job => {
                if self.last_run >= self.params.resume_backoff.max {
                    self.self_interrupts = 0;
                }
                let delay = self.params.resume_backoff.next(self.self_interrupts);
                self.self_interrupts = self.self_interrupts.saturating_add(1);
                Some(delay)
            }
        }
    }

    /// Runs the work once; returns a final state or the interruption reason.
    async fn run_once(&mut self, lifetime: &CancellationToken) -> RunEnd {
        self.attempt += 1;
        self.set_state(JobState::Running);
        self.publish(Event::new(EventKind::JobStarting).with_attempt(self.attempt));

        let task = Arc::clone(self.spec.task());
        let run_token = lifetime.child_token();
        let mut work = AssertUnwindSafe(task.run(run_token.clone())).catch_unwind();

        let started = time::Instant::now();
        let ended = tokio::select! {
            biased;
            _ = lifetime.cancelled() => Ended::Cancelled,
            res = &mut work => Ended::Returned(res),
            _ = next_interrupt(&mut self.interrupts) => Ended::Interrupted,
        };
        self.last_run = started.elapsed();

        let res = match ended {
            Ended::Cancelled => {
                self.unwind(&run_token, work).await;
                return RunEnd::Finished(JobState::Terminated(TerminationReason::Cancelled));
            }
            Ended::Interrupted => {
                self.unwind(&run_token, work).await;
                self.interrupts.borrow_and_update();
                return RunEnd::Interrupted(Source::Session, "session interrupted".to_string());
            }
            Ended::Returned(res) => res.unwrap_or_else(|panic| Err(self.panicked(panic))),
        };

        match res {
            Ok(()) => RunEnd::Finished(JobState::Terminated(TerminationReason::Completed)),
            Err(TaskError::Canceled) => {
                RunEnd::Finished(JobState::Terminated(TerminationReason::Cancelled))
            }
            Err(err) if err.is_interruption() => {
                self.interrupts.borrow_and_update();
                RunEnd::Interrupted(Source::Job, err.to_string())
            }
            Err(err) => RunEnd::Finished(JobState::Failed(err)),
        }
    }

    /// Applies the interruption rules: closed session first, then the resume policy.
    ///
    /// Returns `None` when the job should resume.
    async fn decide(&self, lifetime: &CancellationToken) -> Option<JobState> {
        if self.session.is_closed() {
            return Some(JobState::Terminated(TerminationReason::SessionClosed));
        }
        let resume = tokio::select! {
            biased;
            _ = lifetime.cancelled() => {
                return Some(JobState::Terminated(TerminationReason::Cancelled));
            }
            resume = self.spec.resume().evaluate() => resume,
        };
        if resume {
            None
        } else {
            Some(JobState::Terminated(TerminationReason::PolicyDeclined))
        }
    }

    /// Cancels the run token and gives the work a bounded chance to unwind.
    async fn unwind<F: Future>(&self, run_token: &CancellationToken, work: F) {
        run_token.cancel();
        let Some(limit) = self.params.unwind_grace else {
            return;
        };
        if time::timeout(limit, work).await.is_err() {
            tracing::warn!(
                task = &*self.name,
                limit_ms = limit.as_millis() as u64,
                "job did not unwind in time; dropping it"
            );
        }
    }

    fn panicked(&self, panic: Box<dyn Any + Send>) -> TaskError {
        let info = panic_message(panic.as_ref());
        tracing::error!(task = &*self.name, %info, "job panicked");
        TaskError::Fatal {
            error: format!("panicked: {info}"),
        }
    }

    fn finish(&self, state: JobState) {
        let ev = match &state {
            JobState::Terminated(reason) => {
                Event::new(EventKind::JobTerminated).with_reason(reason.as_label())
            }
            JobState::Failed(err) => Event::new(EventKind::JobFailed)
                .with_attempt(self.attempt)
                .with_reason(err.to_string()),
            _ => return,
        };
        self.state.send_replace(state);
        self.publish(ev);
    }

    fn set_state(&self, state: JobState) {
        self.state.send_replace(state);
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_task(Arc::clone(&self.name)));
    }
}

/// Completes on the next interruption; never completes once the sender is gone.
async fn next_interrupt(rx: &mut watch::Receiver<u64>) {
    if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
