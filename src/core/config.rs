//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the bot runtime.
//!
//! Config is used by:
//! 1. **Supervisor**: bus capacity, shutdown grace, per-job unwind grace
//! 2. **JobActor**: delay before re-running a job that interrupted itself
//! 3. **Coordinator**: reconnect backoff, OS signal handling
//! 4. **BotBuilder** / **Bot**: store key prefix, refused-token handling
//!
//! ## Sentinel values
//! - `unwind_grace = 0s` → a cancelled job's work future is dropped without waiting
//! - `key_prefix = ""` → keys are stored without an application prefix

use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Global configuration for the bot runtime.
///
/// ## Field semantics
/// - `grace`: Maximum wait for jobs to stop during shutdown
/// - `unwind_grace`: Maximum wait for one job's work future to unwind after cancellation
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `key_prefix`: Application namespace in the shared store
/// - `reconnect`: Delay policy between gateway reconnects
/// - `resume_backoff`: Delay before re-running a job that returned `Interrupted`
///   while the session stayed ready
/// - `handle_os_signals`: Stop on SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere)
/// - `reset_refused_token`: Forget the stored token when the gateway refuses it
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for every job to stop during shutdown.
    ///
    /// If exceeded, remaining jobs are aborted and
    /// `RuntimeError::GraceExceeded` lists them.
    pub grace: Duration,

    /// Maximum time a cancelled or interrupted job may take to unwind.
    pub unwind_grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Application prefix for store keys and channels.
    pub key_prefix: String,

    /// Reconnect delays after connection-class gateway errors.
    pub reconnect: BackoffPolicy,

    /// Delays between consecutive self-raised interruptions of one job.
    ///
    /// The counter resets when the session itself interrupts the job.
    pub resume_backoff: BackoffPolicy,

    /// Whether the coordinator stops on OS termination signals.
    pub handle_os_signals: bool,

    /// Whether a token refused by the gateway is removed from the settings.
    ///
    /// When `false` the token is kept and the operator must replace it.
    pub reset_refused_token: bool,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the unwind wait as an `Option` (`None` = drop immediately).
    #[inline]
    pub fn unwind_limit(&self) -> Option<Duration> {
        if self.unwind_grace == Duration::ZERO {
            None
        } else {
            Some(self.unwind_grace)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 30s`
    /// - `unwind_grace = 5s`
    /// - `bus_capacity = 1024`
    /// - `key_prefix = "bot"`
    /// - `reconnect = BackoffPolicy::default()` (1s doubling up to 60s, equal jitter)
    /// - `resume_backoff` = 500ms doubling up to 30s, equal jitter
    /// - `handle_os_signals = true`
    /// - `reset_refused_token = true`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            unwind_grace: Duration::from_secs(5),
            bus_capacity: 1024,
            key_prefix: "bot".to_string(),
            reconnect: BackoffPolicy::default(),
            resume_backoff: BackoffPolicy {
                first: Duration::from_millis(500),
                max: Duration::from_secs(30),
                factor: 2.0,
                jitter: JitterPolicy::Equal,
            },
            handle_os_signals: true,
            reset_refused_token: true,
        }
    }
}
