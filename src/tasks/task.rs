//! # Task abstraction.
//!
//! A task receives a [`CancellationToken`] and should stop cooperatively when it fires.
//! The supervisor may call [`Task::run`] several times over the task's lifetime: every
//! resume after an interruption starts the body again from the beginning.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Shared handle to a task object.
pub type TaskRef = Arc<dyn Task>;

/// # Asynchronous, cancelable, re-enterable unit of work.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use async_trait::async_trait;
/// use botvisor::{Task, TaskError};
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Task for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
///         loop {
///             tokio::select! {
///                 _ = ctx.cancelled() => return Err(TaskError::Canceled),
///                 _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => {}
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name (unique per supervisor).
    fn name(&self) -> &str;

    /// Executes one run of the task until completion, interruption or cancellation.
    ///
    /// Return [`TaskError::Interrupted`] for connection-class failures so the
    /// supervisor can resume the task after reconnecting.
    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError>;
}
