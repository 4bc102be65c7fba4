//! # Spindle Executor
//!
//! A work-stealing thread pool built on per-worker [`TaskQueue`]s.
//!
//! ## Architecture
//!
//! ```text
//!  submit ──placement──► [queue 0] [queue 1] ... [queue n-1]   (backlog when n = 0)
//!                           │  ▲ steal back   │
//!                        worker 0 ◄──────── worker 1 ...
//! ```
//!
//! - Each worker pops the front of its own queue and, when that is empty,
//!   steals from the back of its siblings in a fixed rotation.
//! - Idle workers yield instead of parking.
//! - A panicking task never kills its worker: the panic is captured into the
//!   task's [`TaskHandle`](spindle_core::TaskHandle).
//! - Shrinking is lazy: excess workers are flagged, finish their own queue and
//!   exit.
//!
//! [`TaskQueue`]: spindle_scheduler::TaskQueue

#![deny(missing_docs)]
#![warn(clippy::all)]

mod config;
mod pool;
mod worker;

pub use config::{Placement, PoolBuilder, PoolConfig};
pub use pool::{PoolStats, WorkStealingPool};
pub use worker::{current_worker_index, WorkerState};

pub use spindle_core::{PoolError, PoolResult, TaskError, TaskHandle, TaskResult};
