//! # Job specification for supervised execution.
//!
//! [`JobSpec`] bundles a task with the options the supervisor needs:
//! - whether the job is **protected** (survives mass cancellation and interruption),
//! - the [`ResumePolicy`] consulted after each interruption.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use botvisor::{JobSpec, ResumePolicy, TaskError, TaskFn, TaskRef};
//!
//! let poll: TaskRef = TaskFn::arc("poll", |_ctx: CancellationToken| async move {
//!     Ok::<(), TaskError>(())
//! });
//!
//! let spec = JobSpec::new(poll, ResumePolicy::Never).protected();
//! assert!(spec.is_protected());
//! assert_eq!(spec.name(), "poll");
//! ```

use crate::{policies::ResumePolicy, tasks::TaskRef};

/// Specification for running a task under supervision.
#[derive(Clone)]
pub struct JobSpec {
    task: TaskRef,
    protected: bool,
    resume: ResumePolicy,
}

impl JobSpec {
    /// Creates an unprotected job specification.
    pub fn new(task: TaskRef, resume: ResumePolicy) -> Self {
        Self {
            task,
            protected: false,
            resume,
        }
    }

    /// Marks the job as protected.
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Returns a new spec with the given resume policy.
    pub fn with_resume(mut self, resume: ResumePolicy) -> Self {
        self.resume = resume;
        self
    }

    /// Returns reference to the task.
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Convenience: returns the task name.
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Whether the job is exempt from mass cancellation.
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Returns the resume policy.
    pub fn resume(&self) -> &ResumePolicy {
        &self.resume
    }
}
