//! # Spindle
//!
//! Two building blocks for moving work between OS threads:
//!
//! - **Bounded ring channels** ([`bounded`], [`spsc`], [`mpsc`]): fixed
//!   capacity, non-blocking `try_push`/`try_pop`, a single consumer and one or
//!   many producers. The producer mode is part of the type.
//! - **A work-stealing pool** ([`WorkStealingPool`]): one task queue per
//!   worker, idle workers steal from their siblings, and every submission
//!   returns a [`TaskHandle`] that yields the result or the captured panic.
//!
//! ## Example
//!
//! A pool of producers feeding a single consumer through an MPSC channel:
//!
//! ```
//! use spindle::prelude::*;
//! use std::time::Duration;
//!
//! let pool = WorkStealingPool::new(4).unwrap();
//! let (tx, rx) = mpsc::<usize>(64);
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|i| {
//!         let tx = tx.clone();
//!         pool.submit(move || {
//!             let mut item = i;
//!             while let Err(full) = tx.try_push(item) {
//!                 item = full.into_inner();
//!                 std::thread::yield_now();
//!             }
//!         })
//!         .unwrap()
//!     })
//!     .collect();
//!
//! let mut received: Vec<_> = (0..4)
//!     .map(|_| rx.wait_pop(Duration::from_secs(5)).unwrap())
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! received.sort_unstable();
//! assert_eq!(received, vec![0, 1, 2, 3]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

pub use spindle_core::{
    error::*, package, panic_message, Completer, Job, TaskHandle, TaskId, WorkerId,
};

pub use spindle_channel::{
    bounded, mpsc, normalize_capacity, spsc, BoundedChannel, ChannelMode, Consumer, Drain, Mode,
    Mpsc, Producer, Spsc,
};

pub use spindle_scheduler::{steal_order, QueueStats, TaskQueue};

pub use spindle_executor::{
    current_worker_index, Placement, PoolBuilder, PoolConfig, PoolStats, WorkStealingPool,
    WorkerState,
};

pub mod prelude {
    //! Common imports for Spindle users.

    pub use crate::{
        bounded, mpsc, spsc, ChannelError, Consumer, Mpsc, Placement, PoolBuilder, Producer,
        PushError, Spsc, TaskError, TaskHandle, WorkStealingPool,
    };
}
