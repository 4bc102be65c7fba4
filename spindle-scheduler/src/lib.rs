//! Per-worker task queues for the Spindle work-stealing pool.
//!
//! Each worker owns one [`TaskQueue`]. The owner takes work from the front;
//! idle siblings steal from the back, so an owner and a thief only contend
//! when the queue is nearly empty. Queues are the one lock-protected resource
//! in the pool; critical sections are a single `VecDeque` operation.

#![deny(missing_docs)]
#![warn(clippy::all)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use spindle_core::WorkerId;

/// A mutex-guarded double-ended queue of pending work.
///
/// Items are moved in by [`push`](Self::push) and out exactly once by
/// [`pop`](Self::pop), [`steal`](Self::steal) or [`drain`](Self::drain).
pub struct TaskQueue<T> {
    owner: WorkerId,
    items: Mutex<VecDeque<T>>,
    pushed: AtomicU64,
    popped: AtomicU64,
    stolen: AtomicU64,
}

/// Counters describing the traffic through one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Worker owning the queue
    pub owner: WorkerId,
    /// Items currently waiting
    pub queue_length: usize,
    /// Items ever pushed
    pub pushed: u64,
    /// Items taken by the owner
    pub popped: u64,
    /// Items taken by other workers
    pub stolen: u64,
}

impl<T> TaskQueue<T> {
    /// Create an empty queue owned by `owner`.
    #[must_use]
    pub fn new(owner: WorkerId) -> Self {
        Self {
            owner,
            items: Mutex::new(VecDeque::new()),
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            stolen: AtomicU64::new(0),
        }
    }

    /// The worker this queue belongs to.
    #[must_use]
    pub fn owner(&self) -> WorkerId {
        self.owner
    }

    /// Append an item at the back.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Append every item of `batch` under a single lock acquisition.
    pub fn extend<I>(&self, batch: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut items = self.items.lock();
        let before = items.len();
        items.extend(batch);
        let added = items.len() - before;
        drop(items);
        self.pushed.fetch_add(added as u64, Ordering::Relaxed);
        added
    }

    /// Owner operation: take the oldest item.
    pub fn pop(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.popped.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Thief operation: take the newest item.
    pub fn steal(&self) -> Option<T> {
        let item = self.items.lock().pop_back();
        if item.is_some() {
            self.stolen.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Remove every waiting item, oldest first. Not counted as pops.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    /// Number of waiting items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether no items are waiting.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Snapshot of this queue's counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            owner: self.owner,
            queue_length: self.len(),
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            stolen: self.stolen.load(Ordering::Relaxed),
        }
    }
}

impl<T> std::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("owner", &self.owner)
            .field("len", &self.len())
            .finish()
    }
}

/// Victim order for a worker at index `own` among `len` queues: every other
/// index once, starting just after `own` and wrapping around.
///
/// An `own` index outside `0..len` (a worker whose slot is no longer in the
/// snapshot) visits every queue.
pub fn steal_order(own: usize, len: usize) -> impl Iterator<Item = usize> {
    let start = if own < len { own + 1 } else { 0 };
    let count = if own < len { len - 1 } else { len };
    (0..count).map(move |offset| (start + offset) % len)
}
