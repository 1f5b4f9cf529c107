//! # Restart signal channel.
//!
//! Pub/sub control plane over the shared store. Any process (the bot itself, a
//! management web app, an operator shell) can `signal` a channel; every live
//! listener receives the payload.
//!
//! ## Delivery
//! - at-most-once, fire-and-forget: nothing is queued for absent listeners;
//! - a dropped subscription surfaces as [`TaskError::Interrupted`], so the
//!   supervisor resubscribes the listener after the session is ready again;
//! - the delivered-message count survives resumes, so a listener with
//!   `limit = Some(1)` never fires twice.
//!
//! ```text
//! signal("restart") ──► store.publish("{prefix}:channel:restart", "1")
//!                                      │
//!                   ListenerTask::run ◄┘  on_message("1") ─► stop(Restart)
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::{JobHandle, Supervisor};
use crate::error::{RuntimeError, SignalError, StoreError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::ResumePolicy;
use crate::store::Cache;
use crate::tasks::{JobSpec, Task, TaskRef};

/// Channel that asks the bot to shut down.
pub const SHUTDOWN_CHANNEL: &str = "shutdown";
/// Channel that asks the bot to restart.
pub const RESTART_CHANNEL: &str = "restart";
/// Payload sent when none is given.
pub const DEFAULT_PAYLOAD: &str = "1";

/// Publishes and listens for control messages on namespaced store channels.
#[derive(Clone)]
pub struct SignalChannel {
    cache: Cache,
    bus: Option<Bus>,
}

impl SignalChannel {
    /// Creates a channel helper over `cache`'s namespace.
    pub fn new(cache: Cache) -> Self {
        Self { cache, bus: None }
    }

    /// Publishes `SignalReceived` events for delivered messages.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sends the default payload. Returns the number of listeners reached.
    pub async fn signal(&self, channel: &str) -> Result<usize, StoreError> {
        self.signal_with(channel, DEFAULT_PAYLOAD).await
    }

    /// Sends `payload`. Returns the number of listeners reached.
    pub async fn signal_with(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        let reached = self.cache.publish(channel, payload).await?;
        tracing::debug!(channel, reached, "control message published");
        Ok(reached)
    }

    /// Builds a listener task for `channel`.
    ///
    /// `on_message` runs once per delivered message, until `limit` messages were
    /// delivered (`None` = unlimited) or the task is cancelled.
    pub fn listen_for<F, Fut>(
        &self,
        channel: &str,
        limit: Option<usize>,
        on_message: F,
    ) -> Result<TaskRef, SignalError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if limit == Some(0) {
            return Err(SignalError::InvalidLimit);
        }
        Ok(Arc::new(ListenerTask {
            name: format!("{channel}_listener"),
            channel: channel.to_string(),
            limit,
            delivered: Arc::new(AtomicUsize::new(0)),
            cache: self.cache.clone(),
            bus: self.bus.clone(),
            on_message,
        }))
    }

    /// Registers a protected listener that resumes after every reconnect.
    pub async fn spawn_listener<F, Fut>(
        &self,
        supervisor: &Supervisor,
        channel: &str,
        limit: Option<usize>,
        on_message: F,
    ) -> Result<JobHandle, RuntimeError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = self.listen_for(channel, limit, on_message)?;
        supervisor
            .register(JobSpec::new(task, ResumePolicy::Always).protected())
            .await
    }
}

struct ListenerTask<F> {
    name: String,
    channel: String,
    limit: Option<usize>,
    delivered: Arc<AtomicUsize>,
    cache: Cache,
    bus: Option<Bus>,
    on_message: F,
}

impl<F> ListenerTask<F> {
    fn exhausted(&self, delivered: usize) -> bool {
        self.limit.is_some_and(|limit| delivered >= limit)
    }
}

#[async_trait]
impl<F, Fut> Task for ListenerTask<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        if self.exhausted(self.delivered.load(Ordering::SeqCst)) {
            return Ok(());
        }

        let mut messages = tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            sub = self.cache.subscribe(&self.channel) => sub?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(()),
                next = messages.next() => next,
            };

            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(err)) => return Err(err.into()),
                None => {
                    return Err(TaskError::interrupted(format!(
                        "subscription to '{}' dropped",
                        self.channel
                    )));
                }
            };

            let delivered = self.delivered.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(bus) = &self.bus {
                bus.publish(
                    Event::new(EventKind::SignalReceived)
                        .with_task(self.channel.as_str())
                        .with_reason(payload.as_str()),
                );
            }
            (self.on_message)(payload).await;

            if self.exhausted(delivered) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, TerminationReason};
    use crate::policies::{BackoffPolicy, JitterPolicy};
    use crate::session::Session;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn supervised() -> (Session, Arc<Supervisor>) {
        let session = Session::new();
        let cfg = Config {
            resume_backoff: BackoffPolicy {
                first: Duration::from_millis(10),
                max: Duration::from_millis(100),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            ..Config::default()
        };
        let sup = Supervisor::new(cfg, Vec::new(), session.watch());
        session.mark_ready();
        (session, sup)
    }

    fn channel(store: Arc<MemoryStore>) -> SignalChannel {
        SignalChannel::new(Cache::new(store, "test"))
    }

    async fn wait_for_subscriber(store: &MemoryStore, channel: &str) {
        while store.subscriber_count(channel).await == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn zero_limit_is_rejected() {
        let signals = channel(Arc::new(MemoryStore::new()));
        let err = signals
            .listen_for("restart", Some(0), |_| async {})
            .err()
            .expect("zero limit must fail");
        assert_eq!(err, SignalError::InvalidLimit);
    }

    #[tokio::test]
    async fn signal_without_listeners_reaches_nobody() {
        let signals = channel(Arc::new(MemoryStore::new()));
        assert_eq!(signals.signal(SHUTDOWN_CHANNEL).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn one_shot_listener_stops_after_first_message() {
        let store = Arc::new(MemoryStore::new());
        let signals = channel(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = signals
            .listen_for("restart", Some(1), move |payload| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(payload);
                }
            })
            .unwrap();
        assert_eq!(task.name(), "restart_listener");

        let run = tokio::spawn({
            let task = task.clone();
            async move { task.run(CancellationToken::new()).await }
        });
        wait_for_subscriber(&store, "test:channel:restart").await;

        assert_eq!(signals.signal_with("restart", "now").await.unwrap(), 1);
        assert_eq!(run.await.unwrap(), Ok(()));
        assert_eq!(rx.recv().await.as_deref(), Some("now"));

        // A resumed one-shot listener must not fire again.
        let again = tokio::time::timeout(
            Duration::from_secs(1),
            task.run(CancellationToken::new()),
        )
        .await
        .expect("exhausted listener returns immediately");
        assert_eq!(again, Ok(()));
    }

    #[tokio::test]
    async fn dropped_subscription_is_an_interruption() {
        let store = Arc::new(MemoryStore::new());
        let signals = channel(store.clone());
        let task = signals.listen_for("shutdown", None, |_| async {}).unwrap();

        let run = tokio::spawn({
            let task = task.clone();
            async move { task.run(CancellationToken::new()).await }
        });
        wait_for_subscriber(&store, "test:channel:shutdown").await;

        store.drop_subscriptions().await;
        let err = run.await.unwrap().unwrap_err();
        assert!(err.is_interruption());
    }

    #[tokio::test]
    async fn cancellation_ends_the_listener_cleanly() {
        let store = Arc::new(MemoryStore::new());
        let signals = channel(store.clone());
        let task = signals.listen_for("shutdown", None, |_| async {}).unwrap();
        let token = CancellationToken::new();

        let run = tokio::spawn({
            let (task, token) = (task.clone(), token.clone());
            async move { task.run(token).await }
        });
        wait_for_subscriber(&store, "test:channel:shutdown").await;

        token.cancel();
        assert_eq!(run.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn supervised_listener_resubscribes_after_a_drop() {
        let store = Arc::new(MemoryStore::new());
        let signals = channel(store.clone());
        let (_session, sup) = supervised();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let job = signals
            .spawn_listener(&sup, "restart", None, move |payload| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(payload);
                }
            })
            .await
            .unwrap();
        wait_for_subscriber(&store, "test:channel:restart").await;

        store.drop_subscriptions().await;
        wait_for_subscriber(&store, "test:channel:restart").await;
        assert!(!job.state().is_final());

        assert_eq!(signals.signal_with("restart", "again").await.unwrap(), 1);
        assert_eq!(rx.recv().await.as_deref(), Some("again"));
        sup.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn supervised_one_shot_listener_ignores_later_messages() {
        let store = Arc::new(MemoryStore::new());
        let signals = channel(store.clone());
        let (_session, sup) = supervised();
        let calls = Arc::new(AtomicUsize::new(0));

        let job = signals
            .spawn_listener(&sup, "shutdown", Some(1), {
                let calls = calls.clone();
                move |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
            .await
            .unwrap();
        wait_for_subscriber(&store, "test:channel:shutdown").await;

        assert_eq!(signals.signal("shutdown").await.unwrap(), 1);
        assert_eq!(job.wait().await, Ok(TerminationReason::Completed));
        assert_eq!(signals.signal("shutdown").await.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
