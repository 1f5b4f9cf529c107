//! # Task abstractions and specifications.
//!
//! - [`Task`] - trait for implementing async cancelable tasks
//! - [`TaskFn`] - function-based task implementation
//! - [`TaskRef`] - shared reference to a task (`Arc<dyn Task>`)
//! - [`JobSpec`] - task plus supervision options

mod spec;
mod task;
mod task_fn;

pub use spec::JobSpec;
pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
