//! Error types used by the botvisor runtime, its jobs and its collaborators.
//!
//! This module defines:
//!
//! - [`RuntimeError`]: errors raised by the orchestration runtime itself.
//! - [`TaskError`]: errors raised by individual job runs.
//! - [`GatewayError`]: errors reported by the chat gateway.
//! - [`StoreError`]: errors reported by the shared key-value/pub-sub store.
//! - [`SignalError`]: invalid restart/shutdown listener configuration.
//! - [`SettingsError`]: invalid persisted bot settings.
//!
//! Every enum provides `as_label` for logs/metrics, like the rest of the runtime.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the botvisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some jobs remained stuck and had to be aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the jobs that did not shut down in time.
        stuck: Vec<String>,
    },

    /// A job with the same name is already supervised.
    #[error("job '{name}' is already registered")]
    JobExists {
        /// The duplicated job name.
        name: String,
    },

    /// The coordinator was started twice; a process instance owns one session.
    #[error("session already started for this process instance")]
    AlreadyStarted,

    /// No bot token has been stored yet.
    #[error("no bot token configured")]
    MissingToken,

    /// The gateway rejected the stored token. Restarting is disabled.
    #[error("the gateway rejected the configured token")]
    InvalidCredentials,

    /// Unrecoverable gateway failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Shared store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Listener configuration failure.
    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use botvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::JobExists { .. } => "runtime_job_exists",
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::MissingToken => "runtime_missing_token",
            RuntimeError::InvalidCredentials => "runtime_invalid_credentials",
            RuntimeError::Gateway(_) => "runtime_gateway",
            RuntimeError::Store(_) => "runtime_store",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }

    /// True for errors that must not be retried by relaunching the process.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(
            self,
            RuntimeError::InvalidCredentials | RuntimeError::MissingToken
        )
    }
}

/// # Errors produced by a job run.
///
/// [`TaskError::Interrupted`] is the connection-class interruption: the supervisor
/// consults the job's resume policy instead of failing the job. Every other
/// variant except [`TaskError::Canceled`] ends the job as failed.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The run lost its connection (socket closed, handshake failure, timeout).
    #[error("interrupted: {reason}")]
    Interrupted {
        /// What interrupted the run.
        reason: String,
    },

    /// Non-recoverable fatal error.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Ordinary failure inside the job body.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The job observed its cancellation token and exited.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Interrupted`].
    pub fn interrupted(reason: impl Into<String>) -> Self {
        TaskError::Interrupted {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use botvisor::TaskError;
    ///
    /// let err = TaskError::interrupted("socket closed");
    /// assert_eq!(err.as_label(), "task_interrupted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Interrupted { .. } => "task_interrupted",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Whether the supervisor treats this error as a connection-class interruption.
    ///
    /// # Example
    /// ```
    /// use botvisor::TaskError;
    ///
    /// assert!(TaskError::interrupted("timeout").is_interruption());
    /// assert!(!TaskError::fail("boom").is_interruption());
    /// ```
    pub fn is_interruption(&self) -> bool {
        matches!(self, TaskError::Interrupted { .. })
    }
}

impl From<GatewayError> for TaskError {
    fn from(err: GatewayError) -> Self {
        if err.is_connection() {
            TaskError::interrupted(err.to_string())
        } else {
            TaskError::fail(err.to_string())
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => TaskError::Interrupted { reason },
            other => TaskError::fail(other.to_string()),
        }
    }
}

/// # Errors reported by the chat gateway.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway did not answer in time.
    #[error("gateway timed out after {0:?}")]
    Timeout(Duration),

    /// The socket was closed by the remote side or the network.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The protocol handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The token was refused.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Anything else the client library reports.
    #[error("gateway error: {0}")]
    Other(String),
}

impl GatewayError {
    /// Connection-class errors are retried by reconnecting.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_) | GatewayError::ConnectionClosed(_) | GatewayError::Handshake(_)
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            GatewayError::Timeout(_) => "gateway_timeout",
            GatewayError::ConnectionClosed(_) => "gateway_connection_closed",
            GatewayError::Handshake(_) => "gateway_handshake",
            GatewayError::InvalidCredentials => "gateway_invalid_credentials",
            GatewayError::Other(_) => "gateway_other",
        }
    }
}

/// # Errors reported by the shared store.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached (or the subscription dropped).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be (de)serialized.
    #[error("stored value is malformed: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "store_unavailable",
            StoreError::Codec(_) => "store_codec",
        }
    }
}

/// # Invalid listener configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// A message limit must be greater than zero.
    #[error("limit must be greater than 0")]
    InvalidLimit,
}

/// # Errors raised while editing persisted bot settings.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The value entered does not look like a bot token.
    #[error("that does not look like a valid token")]
    NotAToken,

    /// The prefix is already registered.
    #[error("prefix '{0}' already exists")]
    PrefixAlreadyExists(String),

    /// The prefix is not registered.
    #[error("prefix '{0}' not found")]
    PrefixNotFound(String),

    /// Shared store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SettingsError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SettingsError::NotAToken => "settings_not_a_token",
            SettingsError::PrefixAlreadyExists(_) => "settings_prefix_exists",
            SettingsError::PrefixNotFound(_) => "settings_prefix_not_found",
            SettingsError::Store(_) => "settings_store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_connection_errors_become_interruptions() {
        let err: TaskError = GatewayError::ConnectionClosed("1006".into()).into();
        assert!(err.is_interruption());

        let err: TaskError = GatewayError::Timeout(Duration::from_secs(3)).into();
        assert!(err.is_interruption());

        let err: TaskError = GatewayError::Other("bad request".into()).into();
        assert_eq!(err.as_label(), "task_failed");
    }

    #[test]
    fn store_outage_is_an_interruption() {
        let err: TaskError = StoreError::Unavailable("reset by peer".into()).into();
        assert_eq!(
            err,
            TaskError::Interrupted {
                reason: "reset by peer".into()
            }
        );
    }

    #[test]
    fn credential_errors_are_fatal_configuration() {
        assert!(RuntimeError::InvalidCredentials.is_fatal_configuration());
        assert!(RuntimeError::MissingToken.is_fatal_configuration());
        assert!(!RuntimeError::AlreadyStarted.is_fatal_configuration());
    }
}
