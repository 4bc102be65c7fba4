//! Fixed-capacity ring storage shared by a channel's producer and consumer.
//!
//! # Safety
//!
//! Slot access is unsynchronised; correctness rests on the cursor protocol:
//!
//! ```text
//! producer writes slot, then Release-stores head   ->  consumer Acquire-loads head, then reads slot
//! consumer reads slot, then Release-stores tail    ->  producer Acquire-loads tail, then reuses slot
//! ```
//!
//! In MPSC mode the reservation of `head` happens under a spinlock and the
//! value is written after the lock is dropped, so a reserved slot is not yet
//! readable. Each slot therefore carries a state word that the producer
//! Release-stores once the value is in place; the consumer Acquire-loads it
//! before reading.
//!
//! Slots in `[tail, head)` are initialised (READY, for MPSC); all others are
//! uninitialised.

use core::fmt;
use core::marker::PhantomData;
use std::cell::{Cell, UnsafeCell};
use std::mem::{self, MaybeUninit};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::{Backoff, CachePadded};
use spindle_core::error::{ChannelError, ChannelResult, PushError};

use crate::mode::{ChannelMode, Mode, Mpsc};
use crate::spin::SpinLock;

const EMPTY: u8 = 0;
const READY: u8 = 1;
const ABANDONED: u8 = 2;

struct Slot<T> {
    /// Only consulted in MPSC mode.
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Round a requested capacity up to the next power of two; zero becomes one.
///
/// Returns `None` when the rounded size does not fit in a `usize`.
#[must_use]
pub fn normalize_capacity(requested: usize) -> Option<usize> {
    requested.max(1).checked_next_power_of_two()
}

/// A bounded circular buffer for one consumer and one or many producers.
///
/// Obtained through [`bounded`](crate::bounded), which hands out the
/// [`Producer`] and [`Consumer`] ends.
pub struct BoundedChannel<T, M: Mode> {
    /// Producer cursor. In MPSC mode this counts reservations.
    head: CachePadded<AtomicUsize>,
    /// Consumer cursor.
    tail: CachePadded<AtomicUsize>,
    /// Serialises MPSC reservations; untouched in SPSC mode.
    reserve: CachePadded<SpinLock>,
    slots: Box<[Slot<T>]>,
    mask: usize,
    _mode: PhantomData<M>,
}

// SAFETY: the cursor protocol hands each slot to exactly one side at a time,
// and values only move between threads, so `T: Send` is sufficient.
unsafe impl<T: Send, M: Mode> Send for BoundedChannel<T, M> {}
unsafe impl<T: Send, M: Mode> Sync for BoundedChannel<T, M> {}

impl<T, M: Mode> BoundedChannel<T, M> {
    fn with_capacity(requested: usize) -> Self {
        let Some(capacity) = normalize_capacity(requested) else {
            panic!("channel capacity overflow: {requested} slots requested");
        };
        let slots = (0..capacity)
            .map(|_| Slot::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            reserve: CachePadded::new(SpinLock::new()),
            slots,
            mask: capacity - 1,
            _mode: PhantomData,
        }
    }

    /// Number of slots. Always a power of two.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Producer mode of this channel.
    pub fn mode(&self) -> ChannelMode {
        M::KIND
    }

    /// Occupied slot count. A snapshot; may be stale under concurrency.
    pub fn len(&self) -> usize {
        // Load tail first so the difference cannot underflow. Both cursors may
        // move between the loads, hence the clamp.
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(self.capacity())
    }

    /// Whether the channel holds no items. Advisory only.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every slot is occupied. Advisory only.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    fn slot(&self, cursor: usize) -> &Slot<T> {
        &self.slots[cursor & self.mask]
    }

    fn has_room(&self, head: usize) -> bool {
        head.wrapping_sub(self.tail.load(Ordering::Acquire)) < self.capacity()
    }

    /// Claim the next producer cursor, or `None` when full.
    ///
    /// SPSC: the caller is the only writer of `head` and must publish it
    /// after writing the slot. MPSC: `head` is advanced here, under the lock.
    fn reserve(&self) -> Option<usize> {
        if !M::MULTI_PRODUCER {
            let head = self.head.load(Ordering::Relaxed);
            return self.has_room(head).then_some(head);
        }

        // Cheap rejection before touching the lock.
        if !self.has_room(self.head.load(Ordering::Relaxed)) {
            return None;
        }

        let _guard = self.reserve.lock();
        let head = self.head.load(Ordering::Relaxed);
        if !self.has_room(head) {
            return None;
        }
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(head)
    }

    /// Write `value` into a reserved cursor and make it visible.
    ///
    /// # Safety
    ///
    /// `cursor` must come from `reserve` on this thread and not yet be
    /// published.
    unsafe fn publish(&self, cursor: usize, value: T) {
        let slot = self.slot(cursor);
        // SAFETY: the reservation gives this thread exclusive access to the
        // slot until it is published.
        unsafe { (*slot.value.get()).write(value) };
        if M::MULTI_PRODUCER {
            slot.state.store(READY, Ordering::Release);
        } else {
            self.head.store(cursor.wrapping_add(1), Ordering::Release);
        }
    }

    fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        match self.reserve() {
            Some(cursor) => {
                // SAFETY: freshly reserved by this call.
                unsafe { self.publish(cursor, value) };
                Ok(())
            }
            None => Err(PushError::Full(value)),
        }
    }

    fn emplace_with<F>(&self, make: F) -> Result<(), F>
    where
        F: FnOnce() -> T,
    {
        let Some(cursor) = self.reserve() else {
            return Err(make);
        };

        if !M::MULTI_PRODUCER {
            // Nothing is published until the value exists, so an unwinding
            // constructor leaves the channel untouched.
            let value = make();
            // SAFETY: freshly reserved by this call.
            unsafe { self.publish(cursor, value) };
            return Ok(());
        }

        // The cursor is already claimed; if `make` unwinds the consumer must
        // be told to skip the slot.
        let abandon = AbandonOnUnwind(self.slot(cursor));
        let value = make();
        mem::forget(abandon);
        // SAFETY: freshly reserved by this call.
        unsafe { self.publish(cursor, value) };
        Ok(())
    }

    /// Single-consumer pop.
    ///
    /// # Safety
    ///
    /// At most one thread may be inside `try_pop` at any time.
    unsafe fn try_pop(&self) -> ChannelResult<T> {
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);
            if tail == head {
                return Err(ChannelError::Empty);
            }

            let slot = self.slot(tail);
            if M::MULTI_PRODUCER {
                match slot.state.load(Ordering::Acquire) {
                    READY => {}
                    ABANDONED => {
                        slot.state.store(EMPTY, Ordering::Relaxed);
                        self.tail.store(tail.wrapping_add(1), Ordering::Release);
                        continue;
                    }
                    // Reserved but the producer is still writing.
                    _ => return Err(ChannelError::Empty),
                }
            }

            // SAFETY: `tail < head` and (for MPSC) the READY state guarantee
            // the slot was initialised and published to this thread. Reading
            // moves the value out; the slot is uninitialised again.
            let value = unsafe { (*slot.value.get()).assume_init_read() };
            if M::MULTI_PRODUCER {
                slot.state.store(EMPTY, Ordering::Relaxed);
            }
            self.tail.store(tail.wrapping_add(1), Ordering::Release);
            return Ok(value);
        }
    }
}

impl<T, M: Mode> Drop for BoundedChannel<T, M> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let mut tail = *self.tail.get_mut();
        while tail != head {
            let slot = &mut self.slots[tail & self.mask];
            let initialised = !M::MULTI_PRODUCER || *slot.state.get_mut() == READY;
            if initialised {
                // SAFETY: resident slot in `[tail, head)`; `&mut self` rules
                // out concurrent access.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
            tail = tail.wrapping_add(1);
        }
    }
}

impl<T, M: Mode> fmt::Debug for BoundedChannel<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("mode", &M::KIND)
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// Marks a reserved MPSC slot as abandoned if construction unwinds.
struct AbandonOnUnwind<'a, T>(&'a Slot<T>);

impl<T> Drop for AbandonOnUnwind<'_, T> {
    fn drop(&mut self) {
        self.0.state.store(ABANDONED, Ordering::Release);
    }
}

/// Create a bounded channel with at least `capacity` slots.
///
/// The capacity is rounded up to the next power of two, and a request of zero
/// yields a single slot.
///
/// # Panics
///
/// Panics if the rounded capacity overflows `usize`, that is for any request
/// above `usize::MAX / 2 + 1`.
pub fn bounded<T, M: Mode>(capacity: usize) -> (Producer<T, M>, Consumer<T, M>) {
    let channel = Arc::new(BoundedChannel::with_capacity(capacity));
    (
        Producer {
            channel: channel.clone(),
            _not_sync: PhantomData,
        },
        Consumer {
            channel,
            _not_sync: PhantomData,
        },
    )
}

/// Create a single-producer bounded channel.
pub fn spsc<T>(capacity: usize) -> (Producer<T, crate::Spsc>, Consumer<T, crate::Spsc>) {
    bounded(capacity)
}

/// Create a multi-producer bounded channel.
pub fn mpsc<T>(capacity: usize) -> (Producer<T, Mpsc>, Consumer<T, Mpsc>) {
    bounded(capacity)
}

macro_rules! snapshot_accessors {
    () => {
        /// Number of slots. Always a power of two.
        pub fn capacity(&self) -> usize {
            self.channel.capacity()
        }

        /// Producer mode of the channel.
        pub fn mode(&self) -> ChannelMode {
            self.channel.mode()
        }

        /// Occupied slot count. A snapshot; advisory only.
        pub fn len(&self) -> usize {
            self.channel.len()
        }

        /// Whether the channel is empty. Advisory only.
        pub fn is_empty(&self) -> bool {
            self.channel.is_empty()
        }

        /// Whether the channel is full. Advisory only.
        pub fn is_full(&self) -> bool {
            self.channel.is_full()
        }
    };
}

/// The sending end of a [`BoundedChannel`].
///
/// Not `Sync`: producers are shared by cloning (MPSC only), never by
/// reference.
pub struct Producer<T, M: Mode> {
    channel: Arc<BoundedChannel<T, M>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T, M: Mode> Producer<T, M> {
    /// Push `value` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] carrying `value` back when every slot is
    /// occupied.
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        self.channel.try_push(value)
    }

    /// Admit an item first, then build it with `make` directly into the
    /// reserved slot. `make` is not called when the channel is full.
    ///
    /// # Errors
    ///
    /// Returns `make` unused when every slot is occupied.
    pub fn emplace_with<F>(&self, make: F) -> Result<(), F>
    where
        F: FnOnce() -> T,
    {
        self.channel.emplace_with(make)
    }

    snapshot_accessors!();
}

impl<T> Clone for Producer<T, Mpsc> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            _not_sync: PhantomData,
        }
    }
}

impl<T, M: Mode> fmt::Debug for Producer<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Producer").field(&self.channel).finish()
    }
}

/// The receiving end of a [`BoundedChannel`]. There is exactly one.
pub struct Consumer<T, M: Mode> {
    channel: Arc<BoundedChannel<T, M>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T, M: Mode> Consumer<T, M> {
    /// Pop the oldest published item without blocking.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Empty`] when nothing is ready.
    pub fn try_pop(&self) -> ChannelResult<T> {
        // SAFETY: `Consumer` is neither `Clone` nor `Sync`, so this is the
        // only thread able to pop.
        unsafe { self.channel.try_pop() }
    }

    /// Poll [`try_pop`](Self::try_pop) until an item arrives or `timeout`
    /// elapses. Spins with backoff between attempts; never parks.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Timeout`] when nothing arrived in time.
    pub fn wait_pop(&self, timeout: Duration) -> ChannelResult<T> {
        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            if let Ok(value) = self.try_pop() {
                return Ok(value);
            }
            if start.elapsed() >= timeout {
                return Err(ChannelError::Timeout);
            }
            backoff.snooze();
        }
    }

    /// Iterate over items currently available, stopping at the first empty
    /// observation.
    pub fn drain(&self) -> Drain<'_, T, M> {
        Drain { consumer: self }
    }

    snapshot_accessors!();
}

impl<T, M: Mode> fmt::Debug for Consumer<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Consumer").field(&self.channel).finish()
    }
}

/// Iterator returned by [`Consumer::drain`].
pub struct Drain<'a, T, M: Mode> {
    consumer: &'a Consumer<T, M>,
}

impl<T, M: Mode> Iterator for Drain<'_, T, M> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.consumer.try_pop().ok()
    }
}
