use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::control::{
    RESTART_CHANNEL, RestartControl, SHUTDOWN_CHANNEL, Settings, SignalChannel,
};
use crate::core::bot::{Bot, spawn_failure_watcher, startup_task};
use crate::core::config::Config;
use crate::core::coordinator::{Coordinator, StopReason};
use crate::core::supervisor::Supervisor;
use crate::error::RuntimeError;
use crate::policies::ResumePolicy;
use crate::session::{Gateway, Session};
use crate::store::{Cache, Store};
use crate::subscribers::Subscribe;
use crate::tasks::JobSpec;

/// Builder for a [`Bot`] wired to one store and one gateway.
pub struct BotBuilder {
    cfg: Config,
    store: Arc<dyn Store>,
    gateway: Arc<dyn Gateway>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl BotBuilder {
    /// Creates a new builder with the given configuration and collaborators.
    pub fn new(cfg: Config, store: Arc<dyn Store>, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            cfg,
            store,
            gateway,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (job lifecycle, session changes, control
    /// messages) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the bot and registers its core jobs.
    ///
    /// Core jobs are registered before anything else, all protected:
    /// - `shutdown_listener`: one-shot; disables restarting, then stops with `Shutdown`
    /// - `restart_listener`: one-shot; stops with `Restart`
    /// - `startup`: once ready, enables restarting, records the owner and announces a pending restart
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn build(self) -> Result<Bot, RuntimeError> {
        let cache = Cache::new(self.store, self.cfg.key_prefix.clone());
        let restart = RestartControl::new(cache.clone());
        let settings = Settings::new(cache.clone());

        let session = Arc::new(Session::new());
        let supervisor = Supervisor::new(self.cfg, self.subscribers, session.watch());
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&supervisor),
            Arc::clone(&self.gateway),
            session,
            restart.clone(),
        ));
        let signals = SignalChannel::new(cache.clone()).with_bus(supervisor.bus().clone());
        let stop = coordinator.stop_handle();

        let mut core = Vec::with_capacity(3);
        let on_shutdown = {
            let (stop, restart) = (stop.clone(), restart.clone());
            move |_payload: String| {
                let (stop, restart) = (stop.clone(), restart.clone());
                async move {
                    if let Err(err) = restart.disable_restarting().await {
                        tracing::warn!(error = %err, "cannot persist restart flag");
                    }
                    stop.stop(StopReason::Shutdown);
                }
            }
        };
        let job = signals
            .spawn_listener(&supervisor, SHUTDOWN_CHANNEL, Some(1), on_shutdown)
            .await?;
        core.push(job.name().to_string());

        let on_restart = {
            let stop = stop.clone();
            move |_payload: String| {
                let stop = stop.clone();
                async move { stop.stop(StopReason::Restart) }
            }
        };
        let job = signals
            .spawn_listener(&supervisor, RESTART_CHANNEL, Some(1), on_restart)
            .await?;
        core.push(job.name().to_string());

        let startup = startup_task(restart.clone(), settings.clone(), Arc::clone(&self.gateway));
        let job = supervisor
            .register(JobSpec::new(startup, ResumePolicy::Never).protected())
            .await?;
        core.push(job.name().to_string());

        let done = CancellationToken::new();
        spawn_failure_watcher(
            supervisor.bus(),
            restart.clone(),
            stop,
            core,
            done.clone(),
        );

        Ok(Bot::new(
            supervisor,
            coordinator,
            cache,
            restart,
            settings,
            signals,
            done,
        ))
    }
}
