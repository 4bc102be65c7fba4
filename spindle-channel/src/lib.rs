//! # Spindle Channel
//!
//! Bounded, lock-free-on-the-fast-path ring buffers with a single consumer and
//! either one ([`Spsc`]) or many ([`Mpsc`]) producers.
//!
//! ## Architecture
//!
//! ```text
//! Producer(s) ──try_push──► [ slot | slot | slot | slot ] ──try_pop──► Consumer
//!                              ▲ head (CachePadded)   ▲ tail (CachePadded)
//! ```
//!
//! - Capacity is rounded up to a power of two so indices wrap with a mask.
//! - `head` and `tail` live on separate cache lines.
//! - In MPSC mode a spinlock serialises slot *reservation* only; values are
//!   written outside the lock and published through a per-slot ready flag.
//! - The producer mode is a type parameter, so an SPSC producer cannot be
//!   cloned and the consumer end is never shareable.
//!
//! ## Example
//!
//! ```
//! use spindle_channel::{bounded, Mpsc};
//!
//! let (tx, rx) = bounded::<u32, Mpsc>(3);
//! assert_eq!(tx.capacity(), 4);
//!
//! let tx2 = tx.clone();
//! tx.try_push(1).unwrap();
//! tx2.try_push(2).unwrap();
//!
//! assert_eq!(rx.try_pop(), Ok(1));
//! assert_eq!(rx.try_pop(), Ok(2));
//! assert!(rx.try_pop().is_err());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

mod mode;
mod ring;
mod spin;

pub use mode::{ChannelMode, Mode, Mpsc, Spsc};
pub use ring::{bounded, mpsc, normalize_capacity, spsc, BoundedChannel, Consumer, Drain, Producer};
pub use spin::{SpinGuard, SpinLock};

pub use spindle_core::error::{ChannelError, ChannelResult, PushError};
