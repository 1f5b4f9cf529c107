//! Runtime core: orchestration and lifecycle.
//!
//! Public API: [`Supervisor`], [`Coordinator`], [`Bot`], [`BotBuilder`], [`Launcher`],
//! [`Config`] and the job types.
//!
//! Internal modules:
//! - [`actor`]: runs a single job across readiness, interruptions and cancellation;
//! - [`registry`]: owns job actors and removes finished ones;
//! - [`supervisor`]: event fan-out, mass interrupt/cancel, graceful shutdown;
//! - [`coordinator`]: gateway session, reconnects and the drain sequence;
//! - [`shutdown`]: cross-platform OS termination signals;
//! - [`bot`] / [`builder`]: application context and its core jobs;
//! - [`launcher`]: relaunch loop driven by the restart flag.

mod actor;
mod bot;
mod builder;
mod config;
mod coordinator;
mod job;
mod launcher;
mod registry;
mod shutdown;
mod supervisor;

pub(crate) use actor::panic_message;
pub use bot::{BACK_ONLINE_MESSAGE, Bot};
pub use builder::BotBuilder;
pub use config::Config;
pub use coordinator::{Coordinator, StopHandle, StopReason};
pub use job::{JobHandle, JobState, TerminationReason};
pub use launcher::Launcher;
pub use supervisor::Supervisor;
