//! # Resume policies for interrupted jobs.
//!
//! [`ResumePolicy`] decides whether a job that was interrupted (connection loss or an
//! interruption raised by the job itself) should wait for the session and run again.
//! The policy is evaluated **every** time the job is interrupted; its answer is never
//! cached.
//!
//! - [`ResumePolicy::Always`] resume as long as the session is not closed (default).
//! - [`ResumePolicy::Never`] terminate on the first interruption.
//! - [`ResumePolicy::Check`] ask a [`ResumeCheck`] (e.g. the persisted restart flag).
//!
//! A closed session always wins: the supervisor terminates the job with
//! `SessionClosed` without consulting the policy.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// Predicate consulted when a job is interrupted.
#[async_trait]
pub trait ResumeCheck: Send + Sync + 'static {
    /// Returns `true` if the job should resume after the session becomes ready again.
    async fn should_resume(&self) -> bool;
}

struct FnCheck<F>(F);

#[async_trait]
impl<F> ResumeCheck for FnCheck<F>
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    async fn should_resume(&self) -> bool {
        (self.0)()
    }
}

/// Policy controlling whether an interrupted job resumes.
#[derive(Clone, Default)]
pub enum ResumePolicy {
    /// Resume after every interruption (default).
    #[default]
    Always,
    /// Never resume.
    Never,
    /// Ask the given predicate on every interruption.
    Check(Arc<dyn ResumeCheck>),
}

impl ResumePolicy {
    /// Wraps a [`ResumeCheck`] implementation.
    pub fn check(check: impl ResumeCheck) -> Self {
        ResumePolicy::Check(Arc::new(check))
    }

    /// Wraps a synchronous predicate.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicBool, Ordering};
    /// use botvisor::ResumePolicy;
    ///
    /// let enabled = Arc::new(AtomicBool::new(true));
    /// let flag = enabled.clone();
    /// let policy = ResumePolicy::from_fn(move || flag.load(Ordering::SeqCst));
    /// # let _ = policy;
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        ResumePolicy::Check(Arc::new(FnCheck(f)))
    }

    /// Evaluates the policy now.
    pub async fn evaluate(&self) -> bool {
        match self {
            ResumePolicy::Always => true,
            ResumePolicy::Never => false,
            ResumePolicy::Check(check) => check.should_resume().await,
        }
    }
}

impl fmt::Debug for ResumePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumePolicy::Always => f.write_str("Always"),
            ResumePolicy::Never => f.write_str("Never"),
            ResumePolicy::Check(_) => f.write_str("Check(..)"),
        }
    }
}
