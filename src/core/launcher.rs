//! # Launcher: relaunch loop around [`Bot::run`].
//!
//! ```text
//! loop {
//!   bot = factory()          fresh supervisor, session and core jobs
//!   bot.run()                Err → disable restarting, return Err
//!   restarting_enabled()?    true → relaunch, false → return last StopReason
//! }
//! ```

use std::future::Future;

use crate::control::RestartControl;
use crate::core::bot::Bot;
use crate::core::coordinator::StopReason;
use crate::error::RuntimeError;

/// Relaunches the bot for as long as the restart flag stays enabled.
pub struct Launcher {
    restart: RestartControl,
}

impl Launcher {
    /// Creates a launcher reading the flag through `restart`.
    pub fn new(restart: RestartControl) -> Self {
        Self { restart }
    }

    /// Builds and runs bots until restarting is disabled.
    pub async fn run<F, Fut>(&self, mut factory: F) -> Result<StopReason, RuntimeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Bot, RuntimeError>>,
    {
        let mut launch: u32 = 0;
        loop {
            launch += 1;
            tracing::info!(launch, "launching bot");

            let outcome = match factory().await {
                Ok(bot) => bot.run().await,
                Err(err) => Err(err),
            };
            let reason = match outcome {
                Ok(reason) => reason,
                Err(err) => {
                    tracing::error!(launch, error = %err, label = err.as_label(), "bot run failed");
                    if let Err(store_err) = self.restart.disable_restarting().await {
                        tracing::warn!(error = %store_err, "cannot persist restart flag");
                    }
                    return Err(err);
                }
            };

            if !self.restart.restarting_enabled().await? {
                tracing::info!(launch, reason = reason.as_label(), "bot stopped");
                return Ok(reason);
            }
            tracing::info!(launch, reason = reason.as_label(), "relaunching bot");
        }
    }
}
