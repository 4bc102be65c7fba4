//! # Spindle Core
//!
//! Shared building blocks for the Spindle concurrency library: task and worker
//! identifiers, the boxed [`Job`] type that travels through the work-stealing
//! queues, the [`TaskHandle`] a submitter redeems for a result, and the error
//! taxonomy used by every other crate in the workspace.
//!
//! ## Design Principles
//!
//! - **Failures are values**: nothing is thrown across a thread boundary; a
//!   panic inside a task is captured and handed back through its handle.
//! - **Ownership moves, never aliases**: a job is owned by exactly one queue
//!   until it is taken out and run exactly once.

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

use core::fmt;

pub mod error;
pub mod task;

pub use error::{ChannelError, ChannelResult, PoolError, PoolResult, PushError, TaskError, TaskResult};
pub use task::{package, panic_message, Completer, TaskHandle};

/// A deferred nullary unit of work.
///
/// Arguments are captured by the closure; the pool takes the box out of a
/// queue and invokes it exactly once.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A unique identifier for tasks submitted to a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a new task ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Index of a worker (and of the queue it owns) inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Create a new worker ID.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The worker's position in the pool.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Worker({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id() {
        let id = TaskId::new(42);
        assert_eq!(id.get(), 42);
        assert_eq!(format!("{}", id), "Task(42)");
    }

    #[test]
    fn test_worker_id() {
        let id = WorkerId::new(3);
        assert_eq!(id.index(), 3);
        assert_eq!(id.to_string(), "Worker(3)");
        assert!(WorkerId::new(1) < WorkerId::new(2));
    }

    #[test]
    fn test_job_runs_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let job: Job = Box::new(move || {
            hits_clone.fetch_add(1, Ordering::Relaxed);
        });
        job();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
