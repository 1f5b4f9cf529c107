//! # Job registry: owns job actors and cleans up finished ones.
//!
//! ## Architecture
//! ```text
//! Supervisor::register(spec) ──► Registry::insert()
//!                                   ├─► JobRegistered
//!                                   └─► spawn JobActor (lifetime = runtime.child_token())
//!
//! Bus ──► Registry listener
//!           ├─► JobTerminated(name) ─► cleanup(name)
//!           ├─► JobFailed(name)     ─► cleanup(name)
//!           └─► Lagged              ─► sweep every finished job
//! ```
//!
//! ## Rules
//! - Registry owns the job handles (JoinHandle + tokens + state watch).
//! - Names are unique; a finished job still awaiting cleanup does not block a
//!   new job with the same name.
//! - Cleanup only removes entries whose state is final, so a late event for an
//!   old job never evicts its successor.
//! - Every removal joins the actor and publishes `JobRemoved`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::actor::{JobActor, JobActorParams};
use crate::core::job::{JobHandle, JobState};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::session::SessionWatch;
use crate::tasks::JobSpec;

struct Entry {
    handle: JobHandle,
    join: JoinHandle<()>,
}

impl Entry {
    fn is_finished(&self) -> bool {
        self.handle.state().is_final()
    }
}

/// Registry of supervised jobs.
pub(crate) struct Registry {
    jobs: RwLock<HashMap<String, Entry>>,
    bus: Bus,
    session: SessionWatch,
    params: JobActorParams,
    runtime_token: CancellationToken,
}

impl Registry {
    pub(crate) fn new(
        bus: Bus,
        session: SessionWatch,
        params: JobActorParams,
        runtime_token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            bus,
            session,
            params,
            runtime_token,
        })
    }

    /// Spawns the cleanup listener. Call once during supervisor init.
    pub(crate) fn spawn_listener(self: &Arc<Self>) {
        let mut rx = self.bus.subscribe();
        let rt = self.runtime_token.clone();
        let me = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rt.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => me.handle_event(&ev).await,
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "registry listener lagged; sweeping finished jobs");
                            me.sweep_finished().await;
                        }
                    }
                }
            }
        });
    }

    async fn handle_event(&self, event: &Event) {
        match event.kind {
            EventKind::JobTerminated | EventKind::JobFailed => {
                if let Some(name) = &event.task {
                    self.cleanup(name).await;
                }
            }
            _ => {}
        }
    }

    /// Spawns an actor for `spec` and records it.
    pub(crate) async fn insert(&self, spec: JobSpec) -> Result<JobHandle, RuntimeError> {
        let name = spec.name().to_string();
        let mut jobs = self.jobs.write().await;

        if let Some(existing) = jobs.get(&name) {
            if !existing.is_finished() {
                return Err(RuntimeError::JobExists { name });
            }
            if let Some(stale) = jobs.remove(&name) {
                self.reap_in_background(name.clone(), stale.join);
            }
        }

        let lifetime = self.runtime_token.child_token();
        let (state_tx, state_rx) = watch::channel(JobState::PendingReady);
        let (interrupt_tx, interrupt_rx) = watch::channel(0u64);
        let handle = JobHandle::new(
            Arc::from(name.as_str()),
            spec.is_protected(),
            state_rx,
            Arc::new(interrupt_tx),
            lifetime.clone(),
        );

        let mut ev = Event::new(EventKind::JobRegistered).with_task(name.as_str());
        if spec.is_protected() {
            ev = ev.with_reason("protected");
        }
        self.bus.publish(ev);

        let actor = JobActor::new(
            spec,
            self.params,
            self.bus.clone(),
            self.session.clone(),
            state_tx,
            interrupt_rx,
        );
        let join = tokio::spawn(actor.run(lifetime));

        jobs.insert(
            name,
            Entry {
                handle: handle.clone(),
                join,
            },
        );
        Ok(handle)
    }

    /// Returns sorted list of job names.
    pub(crate) async fn list(&self) -> Vec<String> {
        let jobs = self.jobs.read().await;
        let mut names: Vec<String> = jobs.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Handle for `name`, if registered.
    pub(crate) async fn get(&self, name: &str) -> Option<JobHandle> {
        self.jobs.read().await.get(name).map(|e| e.handle.clone())
    }

    /// Interrupts every job accepted by `select`. Returns how many were interrupted.
    pub(crate) async fn interrupt_where(&self, select: impl Fn(&JobHandle) -> bool) -> usize {
        let jobs = self.jobs.read().await;
        let mut count = 0;
        for entry in jobs.values() {
            if !entry.is_finished() && select(&entry.handle) {
                entry.handle.interrupt();
                count += 1;
            }
        }
        count
    }

    /// Cancels every job accepted by `select`: cancel → join → JobRemoved.
    ///
    /// Returns the names of the removed jobs, sorted.
    pub(crate) async fn cancel_where(&self, select: impl Fn(&JobHandle) -> bool) -> Vec<String> {
        let taken = self.take_where(select).await;
        for (_, entry) in &taken {
            entry.handle.cancel();
        }

        let mut names = Vec::with_capacity(taken.len());
        for (name, entry) in taken {
            self.join_and_report(&name, entry.join).await;
            names.push(name);
        }
        names.sort_unstable();
        names
    }

    /// Cancels every job and joins them before `grace` elapses.
    ///
    /// Returns the names of jobs that had to be aborted.
    pub(crate) async fn cancel_all_within(&self, grace: Duration) -> Vec<String> {
        let taken = self.take_where(|_| true).await;
        for (_, entry) in &taken {
            entry.handle.cancel();
        }

        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();
        for (name, mut entry) in taken {
            match tokio::time::timeout_at(deadline, &mut entry.join).await {
                Ok(_) => {
                    self.bus
                        .publish(Event::new(EventKind::JobRemoved).with_task(name.as_str()));
                }
                Err(_) => {
                    entry.join.abort();
                    stuck.push(name);
                }
            }
        }
        stuck.sort_unstable();
        stuck
    }

    /// Removes `name` if its job has finished.
    async fn cleanup(&self, name: &str) {
        let entry = {
            let mut jobs = self.jobs.write().await;
            match jobs.get(name) {
                Some(entry) if entry.is_finished() => jobs.remove(name),
                _ => None,
            }
        };
        if let Some(entry) = entry {
            self.join_and_report(name, entry.join).await;
        }
    }

    async fn sweep_finished(&self) {
        let finished = self.take_where(|h| h.state().is_final()).await;
        for (name, entry) in finished {
            self.join_and_report(&name, entry.join).await;
        }
    }

    async fn take_where(&self, select: impl Fn(&JobHandle) -> bool) -> Vec<(String, Entry)> {
        let mut jobs = self.jobs.write().await;
        let names: Vec<String> = jobs
            .iter()
            .filter(|(_, e)| select(&e.handle))
            .map(|(name, _)| name.clone())
            .collect();
        names
            .into_iter()
            .filter_map(|name| jobs.remove(&name).map(|e| (name, e)))
            .collect()
    }

    fn reap_in_background(&self, name: String, join: JoinHandle<()>) {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let _ = join.await;
            bus.publish(Event::new(EventKind::JobRemoved).with_task(name));
        });
    }

    /// Awaits the actor and publishes `JobRemoved`.
    async fn join_and_report(&self, name: &str, join: JoinHandle<()>) {
        if let Err(err) = join.await {
            tracing::error!(task = name, error = %err, "job actor ended abnormally");
        }
        self.bus
            .publish(Event::new(EventKind::JobRemoved).with_task(name));
    }
}
