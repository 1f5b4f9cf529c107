//! Resume and reconnect policies.
//!
//! ## Contents
//! - [`ResumePolicy`] whether an interrupted job runs again (always / never / predicate)
//! - [`ResumeCheck`]  async predicate behind [`ResumePolicy::Check`]
//! - [`BackoffPolicy`] how long the coordinator waits between gateway reconnects
//! - [`JitterPolicy`]  randomization applied to reconnect delays
//!
//! ## Quick wiring
//! ```text
//! JobSpec { task, protected, resume: ResumePolicy }
//!      └─► core::actor::JobActor evaluates `resume` after every interruption
//! Config { reconnect: BackoffPolicy, .. }
//!      └─► core::coordinator::Coordinator sleeps `reconnect.next(n)` before reconnect n
//! ```

mod backoff;
mod jitter;
mod resume;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use resume::{ResumeCheck, ResumePolicy};
