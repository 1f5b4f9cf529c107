//! # Bot: application context of one process run.
//!
//! A [`Bot`] bundles the supervisor, the coordinator and the store-backed
//! controls. It is built by [`BotBuilder`](crate::BotBuilder), run once, and
//! discarded; the [`Launcher`](crate::Launcher) builds a fresh one per relaunch.
//!
//! ```text
//! Bot::run()
//!   ├─► settings.token()            missing → MissingToken
//!   └─► coordinator.start(token)    → StopReason
//!
//! failure watcher: JobFailed ─► disable restarting
//!                                └─ core job? ─► stop(JobFailed)
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::control::{RestartControl, Settings, SignalChannel};
use crate::core::coordinator::{Coordinator, StopHandle, StopReason};
use crate::core::job::JobHandle;
use crate::core::supervisor::Supervisor;
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, EventKind};
use crate::policies::ResumePolicy;
use crate::session::Gateway;
use crate::store::Cache;
use crate::tasks::{JobSpec, TaskFn, TaskRef};

/// Message sent to the restart target once the bot is back.
pub const BACK_ONLINE_MESSAGE: &str = "I'm back!";

/// Application context of one process run.
pub struct Bot {
    supervisor: Arc<Supervisor>,
    coordinator: Arc<Coordinator>,
    cache: Cache,
    restart: RestartControl,
    settings: Settings,
    signals: SignalChannel,
    done: CancellationToken,
}

impl Bot {
    pub(crate) fn new(
        supervisor: Arc<Supervisor>,
        coordinator: Arc<Coordinator>,
        cache: Cache,
        restart: RestartControl,
        settings: Settings,
        signals: SignalChannel,
        done: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            coordinator,
            cache,
            restart,
            settings,
            signals,
            done,
        }
    }

    /// Registers a job with explicit options.
    pub async fn register(&self, spec: JobSpec) -> Result<JobHandle, RuntimeError> {
        self.supervisor.register(spec).await
    }

    /// Registers an extension job that resumes only while restarting is enabled.
    pub async fn register_extension(&self, task: TaskRef) -> Result<JobHandle, RuntimeError> {
        let resume = ResumePolicy::while_restarting(self.restart.clone());
        self.supervisor.register(JobSpec::new(task, resume)).await
    }

    /// Store namespace reserved for extension `name`.
    pub fn extension_cache(&self, name: &str) -> Cache {
        self.cache.for_extension(name)
    }

    /// Runs the session with the stored token until it stops.
    ///
    /// A refused token is forgotten so that it can be configured again, unless
    /// [`Config::reset_refused_token`](crate::Config::reset_refused_token) is off.
    pub async fn run(&self) -> Result<StopReason, RuntimeError> {
        let token = self
            .settings
            .token()
            .await?
            .ok_or(RuntimeError::MissingToken)?;

        let outcome = self.coordinator.start(&token).await;
        self.done.cancel();

        let reset = self.supervisor.config().reset_refused_token;
        if let (true, Err(RuntimeError::InvalidCredentials)) = (reset, &outcome) {
            if let Err(err) = self.settings.reset_token().await {
                tracing::warn!(error = %err, "cannot reset refused token");
            }
        }
        outcome
    }

    /// Requests a stop without waiting for it.
    pub fn stop(&self, reason: StopReason) {
        self.coordinator.stop(reason);
    }

    /// A handle that can stop this bot from anywhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.coordinator.stop_handle()
    }

    /// The job supervisor.
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Core store namespace.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Restart flag and target.
    pub fn restart_control(&self) -> &RestartControl {
        &self.restart
    }

    /// Persisted settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Control-channel publisher and listener factory.
    pub fn signals(&self) -> &SignalChannel {
        &self.signals
    }
}

impl Drop for Bot {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

/// Enables restarting once the session is ready, records the owner and greets a
/// pending restart target.
pub(crate) fn startup_task(
    restart: RestartControl,
    settings: Settings,
    gateway: Arc<dyn Gateway>,
) -> TaskRef {
    TaskFn::arc("startup", move |_ctx: CancellationToken| {
        let (restart, settings, gateway) =
            (restart.clone(), settings.clone(), Arc::clone(&gateway));
        async move {
            restart.enable_restarting().await?;
            match gateway.owner_id().await {
                Ok(Some(owner)) => settings.set_owner_id(owner).await?,
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "cannot look up the bot owner"),
            }
            if let Some(target) = restart.get_restart_target().await? {
                if let Err(err) = gateway.send_message(target, BACK_ONLINE_MESSAGE).await {
                    tracing::warn!(%target, error = %err, "cannot announce restart");
                }
                restart.clear_restart_target().await?;
            }
            Ok::<(), TaskError>(())
        }
    })
}

/// Disables restarting when any job fails; stops the bot when a core job fails.
pub(crate) fn spawn_failure_watcher(
    bus: &Bus,
    restart: RestartControl,
    stop: StopHandle,
    core: Vec<String>,
    done: CancellationToken,
) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = done.cancelled() => break,
                msg = rx.recv() => msg,
            };
            match msg {
                Ok(ev) if ev.kind == EventKind::JobFailed => {
                    let task = ev.task.as_deref().unwrap_or("-");
                    let reason = ev.reason.as_deref().unwrap_or("");
                    tracing::error!(task, reason, "job failed; restarting disabled");
                    if let Err(err) = restart.disable_restarting().await {
                        tracing::warn!(error = %err, "cannot persist restart flag");
                    }
                    if core.iter().any(|name| name == task) {
                        stop.stop(StopReason::JobFailed);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "failure watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
