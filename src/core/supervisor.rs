//! # Supervisor: owns job actors, event fan-out and graceful shutdown.
//!
//! The [`Supervisor`] owns the event bus, a [`SubscriberSet`], and the job
//! registry. Jobs are gated on the session: they start only once it is ready,
//! and are interrupted (not failed) when the coordinator loses the connection.
//!
//! ## High-level architecture
//! ```text
//! Supervisor::new(cfg, subscribers, session_watch)
//!   - spawn_forwarder(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!                        ends with runtime_token (after draining queued events)
//!   - registry.spawn_listener(): Bus.subscribe() ─► cleanup finished jobs
//!
//! register(JobSpec) ─► Registry::insert ─► JobActor::run(lifetime)
//!
//! Connection lost (coordinator):
//!   interrupt_unprotected() ─► JobHandle::interrupt() for every unprotected job
//!
//! Drain (coordinator):
//!   cancel_unprotected() ─► cancel → join → JobRemoved
//!   shutdown()           ─► cancel + join every job within cfg.grace
//!                             ├─ all joined → AllStoppedWithin
//!                             └─ timeout    → GraceExceeded + RuntimeError::GraceExceeded
//!                           ─► runtime_token.cancel() → forwarder drains, subscribers flushed
//!
//! Dropping the supervisor cancels `runtime_token` as well, so no background task
//! outlives it.
//! ```
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use botvisor::{Config, ResumePolicy, Session, Supervisor, TaskError, TaskFn, TerminationReason};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new();
//!     let sup = Supervisor::new(Config::default(), Vec::new(), session.watch());
//!
//!     let job = sup
//!         .supervise(
//!             TaskFn::arc("hello", |_ctx: CancellationToken| async { Ok::<(), TaskError>(()) }),
//!             ResumePolicy::Never,
//!         )
//!         .await?;
//!
//!     session.mark_ready();
//!     assert_eq!(job.wait().await, Ok(TerminationReason::Completed));
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::actor::JobActorParams;
use crate::core::config::Config;
use crate::core::job::JobHandle;
use crate::core::registry::Registry;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::ResumePolicy;
use crate::session::SessionWatch;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::{JobSpec, TaskRef};

/// Coordinates job actors, event delivery (via [`SubscriberSet`]), and graceful shutdown.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    registry: Arc<Registry>,
    session: SessionWatch,
    runtime_token: CancellationToken,
}

impl Supervisor {
    /// Creates a supervisor gated on `session` and spawns its listeners.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        cfg: Config,
        subscribers: Vec<Arc<dyn Subscribe>>,
        session: SessionWatch,
    ) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let runtime_token = CancellationToken::new();
        let registry = Registry::new(
            bus.clone(),
            session.clone(),
            JobActorParams {
                unwind_grace: cfg.unwind_limit(),
                resume_backoff: cfg.resume_backoff,
            },
            runtime_token.clone(),
        );

        let forwarder = spawn_forwarder(&bus, subscribers, runtime_token.clone());
        registry.spawn_listener();
        Arc::new(Self {
            cfg,
            bus,
            forwarder: Mutex::new(forwarder),
            registry,
            session,
            runtime_token,
        })
    }

    /// Supervises `task` as an unprotected job.
    pub async fn supervise(
        &self,
        task: TaskRef,
        resume: ResumePolicy,
    ) -> Result<JobHandle, RuntimeError> {
        self.register(JobSpec::new(task, resume)).await
    }

    /// Supervises a job with explicit options.
    ///
    /// Fails with [`RuntimeError::JobExists`] while a job with the same name runs.
    pub async fn register(&self, spec: JobSpec) -> Result<JobHandle, RuntimeError> {
        self.registry.insert(spec).await
    }

    /// Delivers an interruption to every job not named in `except`.
    ///
    /// Returns the number of jobs interrupted.
    pub async fn interrupt_all(&self, except: &[&str]) -> usize {
        self.registry
            .interrupt_where(|h| !except.iter().any(|n| *n == h.name()))
            .await
    }

    /// Delivers an interruption to every unprotected job.
    pub async fn interrupt_unprotected(&self) -> usize {
        self.registry.interrupt_where(|h| !h.is_protected()).await
    }

    /// Cancels every job not named in `except` and waits for each to unwind.
    ///
    /// Returns the names of the cancelled jobs.
    pub async fn cancel_all(&self, except: &[&str]) -> Vec<String> {
        self.registry
            .cancel_where(|h| !except.iter().any(|n| *n == h.name()))
            .await
    }

    /// Cancels every unprotected job and waits for each to unwind.
    pub async fn cancel_unprotected(&self) -> Vec<String> {
        self.registry.cancel_where(|h| !h.is_protected()).await
    }

    /// Cancels every remaining job (protected included) within [`Config::grace`].
    ///
    /// Publishes [`EventKind::AllStoppedWithin`] on success, or
    /// [`EventKind::GraceExceeded`] on timeout and returns
    /// [`RuntimeError::GraceExceeded`] with the list of stuck jobs.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let stuck = self.registry.cancel_all_within(grace).await;

        let res = if stuck.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            self.bus.publish(
                Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
            );
            Err(RuntimeError::GraceExceeded { grace, stuck })
        };

        self.runtime_token.cancel();
        if let Some(forwarder) = self.forwarder.lock().await.take() {
            if let Err(err) = forwarder.await {
                tracing::error!(error = %err, "subscriber forwarder ended abnormally");
            }
        }
        res
    }

    /// Sorted names of the registered jobs.
    pub async fn list(&self) -> Vec<String> {
        self.registry.list().await
    }

    /// Handle for a registered job.
    pub async fn job(&self, name: &str) -> Option<JobHandle> {
        self.registry.get(name).await
    }

    /// The event bus; subscribe to observe job and session events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Read-only view of the session the jobs are gated on.
    pub fn session(&self) -> &SessionWatch {
        &self.session
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

/// Forwards bus events to the subscribers until `stop` is cancelled.
///
/// On stop, events already queued on the bus are still delivered and every
/// subscriber queue is drained before the task ends.
fn spawn_forwarder(
    bus: &Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    stop: CancellationToken,
) -> Option<JoinHandle<()>> {
    if subscribers.is_empty() {
        return None;
    }
    let mut rx = bus.subscribe();
    let set = SubscriberSet::new(subscribers, bus.clone());

    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        loop {
            match rx.try_recv() {
                Ok(ev) => set.emit(&ev),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        set.shutdown().await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::{JobState, TerminationReason};
    use crate::error::TaskError;
    use crate::policies::{BackoffPolicy, JitterPolicy};
    use crate::session::Session;
    use crate::tasks::TaskFn;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn idle(name: &'static str) -> TaskRef {
        TaskFn::arc(name, |ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err(TaskError::Canceled)
        })
    }

    fn counting(name: &'static str, runs: Arc<AtomicUsize>) -> TaskRef {
        TaskFn::arc(name, move |ctx: CancellationToken| {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                ctx.cancelled().await;
                Err(TaskError::Canceled)
            }
        })
    }

    /// Fails with an interruption on the first `flaky` runs, then completes.
    fn interrupted_then_ok(name: &'static str, flaky: usize, runs: Arc<AtomicUsize>) -> TaskRef {
        TaskFn::arc(name, move |_ctx: CancellationToken| {
            let runs = runs.clone();
            async move {
                if runs.fetch_add(1, Ordering::SeqCst) < flaky {
                    return Err(TaskError::interrupted("store unavailable"));
                }
                Ok(())
            }
        })
    }

    #[derive(Default)]
    struct Recorder {
        seen: std::sync::Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(event.kind);
            }
        }
    }

    fn setup() -> (Session, Arc<Supervisor>) {
        let session = Session::new();
        let sup = Supervisor::new(Config::default(), Vec::new(), session.watch());
        (session, sup)
    }

    #[tokio::test]
    async fn jobs_wait_for_the_session() {
        let (session, sup) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = sup
            .supervise(counting("poll", runs.clone()), ResumePolicy::Always)
            .await
            .unwrap();

        tokio::task::yield_now().await;
        assert_eq!(job.state(), JobState::PendingReady);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        session.mark_ready();
        job.wait_until(|s| *s == JobState::Running).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let (_session, sup) = setup();
        sup.supervise(idle("dup"), ResumePolicy::Always).await.unwrap();
        let err = sup
            .supervise(idle("dup"), ResumePolicy::Always)
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "runtime_job_exists");
    }

    #[tokio::test]
    async fn repeated_interrupts_coalesce_into_one_resume() {
        let (session, sup) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = sup
            .supervise(counting("poll", runs.clone()), ResumePolicy::Always)
            .await
            .unwrap();
        session.mark_ready();
        job.wait_until(|s| *s == JobState::Running).await;

        session.mark_connecting();
        job.interrupt();
        job.interrupt();
        job.interrupt();
        job.wait_until(|s| *s == JobState::PendingReady).await;

        session.mark_ready();
        job.wait_until(|s| *s == JobState::Running).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(job.state(), JobState::Running);
    }

    #[tokio::test]
    async fn declined_policy_terminates_without_rerun() {
        let (session, sup) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = sup
            .supervise(counting("once", runs.clone()), ResumePolicy::Never)
            .await
            .unwrap();
        session.mark_ready();
        job.wait_until(|s| *s == JobState::Running).await;

        job.interrupt();
        assert_eq!(job.wait().await, Ok(TerminationReason::PolicyDeclined));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn interrupt_while_pending_skips_the_run() {
        let (_session, sup) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = sup
            .supervise(counting("early", runs.clone()), ResumePolicy::Never)
            .await
            .unwrap();
        job.wait_until(|s| *s == JobState::PendingReady).await;

        assert_eq!(sup.interrupt_unprotected().await, 1);
        assert_eq!(job.wait().await, Ok(TerminationReason::PolicyDeclined));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn closed_session_wins_over_the_policy() {
        let (session, sup) = setup();
        let job = sup.supervise(idle("late"), ResumePolicy::Always).await.unwrap();
        session.mark_ready();
        job.wait_until(|s| *s == JobState::Running).await;

        session.close();
        job.interrupt();
        assert_eq!(job.wait().await, Ok(TerminationReason::SessionClosed));
    }

    #[tokio::test]
    async fn failures_are_returned_unchanged() {
        let (session, sup) = setup();
        let job = sup
            .supervise(
                TaskFn::arc("boom", |_ctx: CancellationToken| async {
                    Err::<(), _>(TaskError::fail("boom"))
                }),
                ResumePolicy::Always,
            )
            .await
            .unwrap();
        session.mark_ready();
        assert_eq!(job.wait().await, Err(TaskError::fail("boom")));
    }

    #[tokio::test]
    async fn panics_become_fatal_failures() {
        let (session, sup) = setup();
        let job = sup
            .supervise(
                TaskFn::arc("panicky", |_ctx: CancellationToken| async {
                    if true {
                        panic!("bad state");
                    }
                    Ok::<(), TaskError>(())
                }),
                ResumePolicy::Always,
            )
            .await
            .unwrap();
        session.mark_ready();
        let err = job.wait().await.unwrap_err();
        assert_eq!(err.as_label(), "task_fatal");
    }

    #[tokio::test]
    async fn cancel_all_waits_and_spares_exceptions() {
        let (session, sup) = setup();
        let a = sup.supervise(idle("a"), ResumePolicy::Always).await.unwrap();
        let b = sup.supervise(idle("b"), ResumePolicy::Always).await.unwrap();
        session.mark_ready();
        a.wait_until(|s| *s == JobState::Running).await;

        let cancelled = sup.cancel_all(&["b"]).await;
        assert_eq!(cancelled, vec!["a".to_string()]);
        assert_eq!(a.state(), JobState::Terminated(TerminationReason::Cancelled));
        assert!(!b.state().is_final());
        assert_eq!(sup.list().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn protected_jobs_survive_mass_operations() {
        let (session, sup) = setup();
        let guard = sup
            .register(JobSpec::new(idle("guard"), ResumePolicy::Always).protected())
            .await
            .unwrap();
        let ext = sup.supervise(idle("ext"), ResumePolicy::Always).await.unwrap();
        session.mark_ready();
        guard.wait_until(|s| *s == JobState::Running).await;

        assert_eq!(sup.interrupt_unprotected().await, 1);
        assert_eq!(sup.cancel_unprotected().await, vec!["ext".to_string()]);
        assert!(ext.state().is_final());
        assert_eq!(guard.state(), JobState::Running);

        sup.shutdown().await.unwrap();
        assert_eq!(guard.state(), JobState::Terminated(TerminationReason::Cancelled));
    }

    #[tokio::test]
    async fn finished_jobs_are_removed_and_names_reusable() {
        let (session, sup) = setup();
        let mut events = sup.bus().subscribe();
        session.mark_ready();
        let job = sup
            .supervise(
                TaskFn::arc("short", |_ctx: CancellationToken| async { Ok::<(), TaskError>(()) }),
                ResumePolicy::Always,
            )
            .await
            .unwrap();
        assert_eq!(job.wait().await, Ok(TerminationReason::Completed));

        loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == EventKind::JobRemoved {
                break;
            }
        }
        assert!(sup.list().await.is_empty());
        sup.supervise(idle("short"), ResumePolicy::Always).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_stuck_jobs() {
        let session = Session::new();
        let cfg = Config {
            grace: Duration::from_secs(1),
            unwind_grace: Duration::from_secs(60),
            ..Config::default()
        };
        let sup = Supervisor::new(cfg, Vec::new(), session.watch());
        let job = sup
            .supervise(
                TaskFn::arc("stubborn", |_ctx: CancellationToken| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<(), TaskError>(())
                }),
                ResumePolicy::Always,
            )
            .await
            .unwrap();
        session.mark_ready();
        job.wait_until(|s| *s == JobState::Running).await;

        match sup.shutdown().await {
            Err(RuntimeError::GraceExceeded { stuck, .. }) => {
                assert_eq!(stuck, vec!["stubborn".to_string()])
            }
            other => panic!("expected GraceExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn interrupt_all_spares_the_named_jobs() {
        let (session, sup) = setup();
        let a = sup.supervise(idle("a"), ResumePolicy::Never).await.unwrap();
        let b = sup.supervise(idle("b"), ResumePolicy::Never).await.unwrap();
        session.mark_ready();
        a.wait_until(|s| *s == JobState::Running).await;
        b.wait_until(|s| *s == JobState::Running).await;

        assert_eq!(sup.interrupt_all(&["b"]).await, 1);
        assert_eq!(a.wait().await, Ok(TerminationReason::PolicyDeclined));
        assert_eq!(b.state(), JobState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn job_raised_interruption_reruns_the_work() {
        let (session, sup) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = sup
            .supervise(interrupted_then_ok("sync", 1, runs.clone()), ResumePolicy::Always)
            .await
            .unwrap();
        session.mark_ready();

        assert_eq!(job.wait().await, Ok(TerminationReason::Completed));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn interrupt_while_pending_runs_once_when_ready() {
        let (session, sup) = setup();
        let mut events = sup.bus().subscribe();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = sup
            .supervise(interrupted_then_ok("early", 0, runs.clone()), ResumePolicy::Always)
            .await
            .unwrap();
        job.wait_until(|s| *s == JobState::PendingReady).await;

        job.interrupt();
        loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == EventKind::JobResuming {
                assert_eq!(ev.delay_ms, None);
                break;
            }
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        session.mark_ready();
        assert_eq!(job.wait().await, Ok(TerminationReason::Completed));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_job_interruptions_back_off() {
        let session = Session::new();
        let cfg = Config {
            resume_backoff: BackoffPolicy {
                first: Duration::from_millis(20),
                max: Duration::from_secs(1),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            ..Config::default()
        };
        let sup = Supervisor::new(cfg, Vec::new(), session.watch());
        let mut events = sup.bus().subscribe();
        let runs = Arc::new(AtomicUsize::new(0));
        sup.supervise(
            interrupted_then_ok("listener", usize::MAX, runs.clone()),
            ResumePolicy::Always,
        )
        .await
        .unwrap();
        session.mark_ready();

        // Runs start at 0ms, 20ms, 60ms and 140ms.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let seen = runs.load(Ordering::SeqCst);
        assert!((2..=4).contains(&seen), "ran {seen} times in 100ms");

        let mut delays = Vec::new();
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::JobResuming {
                delays.push(ev.delay_ms);
            }
        }
        assert_eq!(delays.first(), Some(&Some(20)));
        assert_eq!(delays.get(1), Some(&Some(40)));
        sup.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn subscribers_are_flushed_on_shutdown() {
        let session = Session::new();
        let rec = Arc::new(Recorder::default());
        let sup = Supervisor::new(
            Config::default(),
            vec![rec.clone() as Arc<dyn Subscribe>],
            session.watch(),
        );
        sup.supervise(idle("a"), ResumePolicy::Always).await.unwrap();
        session.mark_ready();

        sup.shutdown().await.unwrap();
        let seen = rec.seen.lock().unwrap().clone();
        assert!(seen.contains(&EventKind::JobRegistered));
        assert!(seen.contains(&EventKind::AllStoppedWithin));
    }

    #[tokio::test]
    async fn dropped_supervisors_release_their_subscribers() {
        let rec = Arc::new(Recorder::default());
        for i in 0..5 {
            let session = Session::new();
            let sup = Supervisor::new(
                Config::default(),
                vec![rec.clone() as Arc<dyn Subscribe>],
                session.watch(),
            );
            sup.supervise(idle("a"), ResumePolicy::Always).await.unwrap();
            if i % 2 == 0 {
                sup.shutdown().await.unwrap();
            }
            drop(sup);
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while Arc::strong_count(&rec) > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber still referenced");
    }
}
