//! # botvisor
//!
//! **Botvisor** is the runtime core of a chat bot: it keeps background jobs alive
//! alongside one persistent gateway session, pauses and resumes them across
//! connection loss, and coordinates restart/shutdown of the whole process through
//! a pub/sub control plane on a shared key-value store.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Launcher::run(factory) ── relaunch while `is_supposed_to_be_running`
//!        │
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Bot                                                              │
//! │  - Coordinator (login, gateway.run loop, reconnect, drain)        │
//! │  - Supervisor  (Registry of JobActors, Bus, SubscriberSet)        │
//! │  - RestartControl / Settings / SignalChannel (over Cache → Store) │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//!  │ shutdown_    │  │ restart_     │  │ extension    │        │
//!  │ listener     │  │ listener     │  │ jobs ...     │        │
//!  │ (protected)  │  │ (protected)  │  │ (resumable)  │        │
//!  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘        │
//!         │ JobStarting, JobInterrupted, JobResuming, ...      │ SessionReady,
//!         ▼                 ▼                 ▼                ▼ SessionLost, ...
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! └──────────┬──────────────────────┬──────────────────────┬──────────┘
//!            ▼                      ▼                      ▼
//!     SubscriberSet          Registry cleanup         failure watcher
//!     (LogWriter, ...)       (finished jobs)          (disable restarting)
//! ```
//!
//! ### Job lifecycle
//! ```text
//! register ─► PendingReady ──session ready──► Running
//!                  ▲                             │ connection lost / Interrupted error
//!                  │                             ▼
//!              Resuming ◄──policy accepts── Interrupted ──session closed──► Terminated(SessionClosed)
//!                                               └──────policy declines──► Terminated(PolicyDeclined)
//! Running ── Ok ──► Terminated(Completed)     Running ── Fail/Fatal ──► Failed(e)
//! any ── cancel ──► Terminated(Cancelled)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Supervision**   | Session-gated jobs, interrupt/resume, mass cancel, shutdown  | [`Supervisor`], [`JobSpec`], [`JobHandle`] |
//! | **Session**       | Gateway loop, reconnect backoff, drain sequence              | [`Coordinator`], [`Gateway`], [`Session`]  |
//! | **Control plane** | Restart/shutdown channels, restart flag and target           | [`SignalChannel`], [`RestartControl`]      |
//! | **Application**   | Core jobs, extensions, relaunch loop, settings               | [`Bot`], [`BotBuilder`], [`Launcher`]      |
//! | **Store**         | Namespaced JSON values and pub/sub                           | [`Store`], [`Cache`], [`MemoryStore`]      |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics)                | [`Subscribe`], [`LogWriter`]               |
//! | **Errors**        | Typed errors for runtime, jobs, gateway and store            | [`RuntimeError`], [`TaskError`]            |
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use botvisor::{Config, ResumePolicy, Session, Supervisor, TaskError, TaskFn, TaskRef};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new();
//!     let sup = Supervisor::new(Config::default(), Vec::new(), session.watch());
//!
//!     let hello: TaskRef = TaskFn::arc("hello", |ctx: CancellationToken| async move {
//!         if ctx.is_cancelled() {
//!             return Err(TaskError::Canceled);
//!         }
//!         println!("Hello once the session is ready!");
//!         Ok(())
//!     });
//!     let job = sup.supervise(hello, ResumePolicy::Always).await?;
//!
//!     session.mark_ready();
//!     job.wait().await?;
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod control;
mod core;
mod error;
mod events;
mod policies;
mod session;
mod store;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use control::{
    DEFAULT_PAYLOAD, FALLBACK_PREFIX, MIN_TOKEN_LEN, RESTART_CHANNEL, RestartControl,
    RestartTarget, SHUTDOWN_CHANNEL, Settings, SignalChannel,
};
pub use core::{
    BACK_ONLINE_MESSAGE, Bot, BotBuilder, Config, Coordinator, JobHandle, JobState, Launcher,
    StopHandle, StopReason, Supervisor, TerminationReason,
};
pub use error::{GatewayError, RuntimeError, SettingsError, SignalError, StoreError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy, ResumeCheck, ResumePolicy};
pub use session::{Gateway, Session, SessionLink, SessionStatus, SessionWatch};
pub use store::{Cache, MemoryStore, MessageStream, Store};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{JobSpec, Task, TaskFn, TaskRef};
