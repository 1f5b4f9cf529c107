//! # Example: simulated
//!
//! Runs a bot against a simulated gateway that drops its connection every few
//! seconds, with an extension job that pauses and resumes around each drop.
//!
//! Shows how to:
//! - Implement the [`Gateway`] contract.
//! - Build a [`Bot`] over a [`MemoryStore`] and relaunch it with [`Launcher`].
//! - Restart and shut down through the store's control channels.
//!
//! ## Flow
//! ```text
//! t=0s   login, session ready, "ticker" starts
//! t=3s   connection drops → ticker interrupted → reconnect → ticker resumes
//! t=7s   restart requested (target 1) → relaunch → "I'm back!" sent to 1
//! t=12s  shutdown requested → restarting disabled → process exits
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info,botvisor=debug cargo run --example simulated
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use botvisor::{
    Bot, BotBuilder, Cache, Config, Gateway, GatewayError, Launcher, LogWriter, MemoryStore,
    RestartControl, RestartTarget, SessionLink, Settings, Subscribe, TaskError, TaskFn, TaskRef,
};

/// Gateway whose connections last `uptime` before dropping.
struct FlakyGateway {
    uptime: Duration,
    connections: AtomicU32,
}

#[async_trait]
impl Gateway for FlakyGateway {
    async fn login(&self, token: &str) -> Result<(), GatewayError> {
        tracing::info!(token_len = token.len(), "logged in");
        Ok(())
    }

    async fn run(&self, link: SessionLink) -> Result<(), GatewayError> {
        let n = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        tokio::time::sleep(Duration::from_millis(200)).await;
        link.ready();
        tracing::info!(connection = n, "connected");

        tokio::select! {
            _ = link.stopping() => Ok(()),
            _ = tokio::time::sleep(self.uptime) => {
                Err(GatewayError::ConnectionClosed(format!("connection {n} reset")))
            }
        }
    }

    async fn send_message(&self, target: RestartTarget, content: &str) -> Result<(), GatewayError> {
        println!("[gateway] to {target}: {content}");
        Ok(())
    }

    async fn close(&self) {
        tracing::info!("gateway closed");
    }
}

fn ticker() -> TaskRef {
    TaskFn::arc("ticker", |ctx: CancellationToken| async move {
        let mut tick = 0u32;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok::<(), TaskError>(()),
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    tick += 1;
                    println!("[ticker] tick {tick}");
                }
            }
        }
    })
}

async fn launch(
    cfg: Config,
    store: Arc<MemoryStore>,
    gateway: Arc<FlakyGateway>,
) -> Result<Bot, botvisor::RuntimeError> {
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let bot = BotBuilder::new(cfg, store, gateway)
        .with_subscribers(subscribers)
        .build()
        .await?;
    bot.register_extension(ticker()).await?;
    Ok(bot)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cfg = Config::default();
    cfg.grace = Duration::from_secs(5);
    cfg.reconnect.first = Duration::from_millis(500);

    let store = Arc::new(MemoryStore::new());
    let cache = Cache::new(store.clone(), cfg.key_prefix.clone());
    Settings::new(cache.clone())
        .set_token(&"x".repeat(64))
        .await?;

    let gateway = Arc::new(FlakyGateway {
        uptime: Duration::from_secs(3),
        connections: AtomicU32::new(0),
    });

    let control = RestartControl::new(cache);
    {
        let control = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            if let Err(err) = control.request_restart(Some(RestartTarget(1))).await {
                tracing::warn!(error = %err, "restart request failed");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
            if let Err(err) = control.request_shutdown().await {
                tracing::warn!(error = %err, "shutdown request failed");
            }
        });
    }

    let reason = Launcher::new(control)
        .run(|| launch(cfg.clone(), store.clone(), gateway.clone()))
        .await?;
    println!("stopped: {}", reason.as_label());
    Ok(())
}
