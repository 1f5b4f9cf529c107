//! # Restart/shutdown policy.
//!
//! Two persisted values decide what happens when the bot stops:
//!
//! | key                         | type            | absent means |
//! |-----------------------------|-----------------|--------------|
//! | `is_supposed_to_be_running` | `bool`          | `false`      |
//! | `restarted_from`            | [`RestartTarget`] | no pending announcement |
//!
//! The flag is enabled once a session becomes ready and disabled on shutdown,
//! credential errors and job failures. The outer [`Launcher`](crate::Launcher)
//! relaunches the bot only while it is set, and extension jobs use it as their
//! resume predicate ([`ResumePolicy::while_restarting`]).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::control::signals::{RESTART_CHANNEL, SHUTDOWN_CHANNEL, SignalChannel};
use crate::error::StoreError;
use crate::policies::{ResumeCheck, ResumePolicy};
use crate::store::Cache;

const RESTART_FLAG_KEY: &str = "is_supposed_to_be_running";
const RESTART_TARGET_KEY: &str = "restarted_from";

/// Channel to notify once the bot is back after a restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestartTarget(pub u64);

impl fmt::Display for RestartTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RestartTarget {
    fn from(id: u64) -> Self {
        RestartTarget(id)
    }
}

/// Reads and writes the restart flag and target; sends restart/shutdown requests.
#[derive(Clone)]
pub struct RestartControl {
    cache: Cache,
    signals: SignalChannel,
}

impl RestartControl {
    /// Creates a control over `cache`'s namespace.
    pub fn new(cache: Cache) -> Self {
        let signals = SignalChannel::new(cache.clone());
        Self { cache, signals }
    }

    /// Makes the bot restart whenever it terminates, until disabled.
    pub async fn enable_restarting(&self) -> Result<(), StoreError> {
        self.cache.set(RESTART_FLAG_KEY, &true, None).await
    }

    /// Prevents restarting for the rest of the current run.
    pub async fn disable_restarting(&self) -> Result<(), StoreError> {
        self.cache.set(RESTART_FLAG_KEY, &false, None).await
    }

    /// Whether the bot should be relaunched when it terminates.
    pub async fn restarting_enabled(&self) -> Result<bool, StoreError> {
        self.cache.get_or(RESTART_FLAG_KEY, false).await
    }

    /// Remembers where a restart was requested from.
    pub async fn set_restart_target(&self, target: RestartTarget) -> Result<(), StoreError> {
        self.cache.set(RESTART_TARGET_KEY, &target, None).await
    }

    /// Pending restart target, if any.
    pub async fn get_restart_target(&self) -> Result<Option<RestartTarget>, StoreError> {
        self.cache.get(RESTART_TARGET_KEY).await
    }

    /// Forgets the pending restart target.
    pub async fn clear_restart_target(&self) -> Result<(), StoreError> {
        self.cache.delete(RESTART_TARGET_KEY).await.map(|_| ())
    }

    /// Stores `target` (if any) and asks running bots to restart.
    ///
    /// Returns the number of listeners reached.
    pub async fn request_restart(&self, target: Option<RestartTarget>) -> Result<usize, StoreError> {
        if let Some(target) = target {
            self.set_restart_target(target).await?;
        }
        self.signals.signal(RESTART_CHANNEL).await
    }

    /// Asks running bots to shut down. Returns the number of listeners reached.
    pub async fn request_shutdown(&self) -> Result<usize, StoreError> {
        self.signals.signal(SHUTDOWN_CHANNEL).await
    }
}

#[async_trait]
impl ResumeCheck for RestartControl {
    async fn should_resume(&self) -> bool {
        match self.restarting_enabled().await {
            Ok(enabled) => enabled,
            Err(err) => {
                tracing::warn!(error = %err, "cannot read restart flag; declining resume");
                false
            }
        }
    }
}

impl ResumePolicy {
    /// Resume only while the persisted restart flag is set.
    pub fn while_restarting(control: RestartControl) -> Self {
        ResumePolicy::check(control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use futures::StreamExt;
    use std::sync::Arc;

    fn control() -> (Arc<MemoryStore>, RestartControl) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), RestartControl::new(Cache::new(store, "bot")))
    }

    #[tokio::test]
    async fn flag_defaults_to_disabled_and_round_trips() {
        let (_, ctl) = control();
        assert!(!ctl.restarting_enabled().await.unwrap());

        ctl.enable_restarting().await.unwrap();
        assert!(ctl.restarting_enabled().await.unwrap());

        ctl.disable_restarting().await.unwrap();
        assert!(!ctl.restarting_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn target_round_trips_and_clears() {
        let (store, ctl) = control();
        assert_eq!(ctl.get_restart_target().await.unwrap(), None);

        ctl.set_restart_target(RestartTarget(42)).await.unwrap();
        assert_eq!(
            store.get("bot_restarted_from").await.unwrap().as_deref(),
            Some("42")
        );
        assert_eq!(ctl.get_restart_target().await.unwrap(), Some(RestartTarget(42)));

        ctl.clear_restart_target().await.unwrap();
        assert_eq!(ctl.get_restart_target().await.unwrap(), None);
    }

    #[tokio::test]
    async fn request_restart_stores_target_then_signals() {
        let (store, ctl) = control();
        let mut sub = store.subscribe("bot:channel:restart").await.unwrap();

        assert_eq!(ctl.request_restart(Some(RestartTarget(7))).await.unwrap(), 1);
        assert_eq!(sub.next().await.unwrap().unwrap(), "1");
        assert_eq!(ctl.get_restart_target().await.unwrap(), Some(RestartTarget(7)));
    }

    #[tokio::test]
    async fn resume_check_follows_the_flag() {
        let (_, ctl) = control();
        let policy = ResumePolicy::while_restarting(ctl.clone());
        assert!(!policy.evaluate().await);

        ctl.enable_restarting().await.unwrap();
        assert!(policy.evaluate().await);
    }
}
