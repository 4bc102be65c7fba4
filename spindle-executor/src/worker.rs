//! Worker threads: per-worker state and the run loop.

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use spindle_core::{panic_message, Job, WorkerId};
use spindle_scheduler::{steal_order, TaskQueue};
use tracing::{debug, trace, warn};

use crate::pool::Shared;

thread_local! {
    static WORKER_INDEX: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Index of the pool worker running on the calling thread, or `None` when
/// called from a thread no pool owns.
#[must_use]
pub fn current_worker_index() -> Option<usize> {
    WORKER_INDEX.with(Cell::get)
}

/// Lifecycle of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Serving its own queue and stealing when idle
    Running,
    /// Shut down or retired; finishing the work left in its own queue
    Draining,
    /// The thread has left its run loop
    Exited,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Exited,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Draining => 1,
            Self::Exited => 2,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// One worker slot: its queue plus the flags the pool uses to steer it.
///
/// Slots outlive their threads; a retired slot keeps its queue so growing the
/// pool again can hand it to a fresh thread.
pub(crate) struct WorkerCell {
    pub(crate) queue: TaskQueue<Job>,
    retired: AtomicBool,
    state: AtomicU8,
}

impl WorkerCell {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            queue: TaskQueue::new(WorkerId::new(index)),
            retired: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::Exited.as_u8()),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.queue.owner().index()
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        let previous = self.state.swap(state.as_u8(), Ordering::AcqRel);
        if previous != state.as_u8() {
            trace!(
                worker = self.index(),
                from = %WorkerState::from_u8(previous),
                to = %state,
                "worker state changed"
            );
        }
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub(crate) fn revive(&self) {
        self.retired.store(false, Ordering::Release);
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

/// Run `job`, containing any panic to the job itself.
///
/// Jobs created by `submit` settle their handle before returning, so a panic
/// arriving here came from a detached job (batch or `submit_to` without a
/// handle).
fn execute(index: usize, job: Job, shared: &Shared) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        shared.metrics.record_panic();
        warn!(
            worker = index,
            message = %panic_message(payload.as_ref()),
            "detached task panicked"
        );
    }
    shared.metrics.record_executed();
}

/// Take one job from a sibling queue, in rotation starting after `index`,
/// then from the pool backlog.
fn find_work(index: usize, shared: &Shared) -> Option<Job> {
    let slots = shared.snapshot();
    for victim in steal_order(index, slots.len()) {
        if let Some(job) = slots[victim].queue.steal() {
            shared.metrics.record_steal();
            trace!(worker = index, victim, "stole task");
            return Some(job);
        }
    }
    shared.backlog.pop()
}

/// Worker thread main loop.
///
/// Own queue first, then steal. A retired worker only finishes its own queue.
/// After shutdown a worker keeps stealing until a full sweep comes back empty,
/// so no queue is left stranded while any worker is alive.
pub(crate) fn run(cell: Arc<WorkerCell>, shared: Arc<Shared>) {
    let index = cell.index();
    WORKER_INDEX.with(|slot| slot.set(Some(index)));
    debug!(worker = index, "worker started");

    loop {
        let running = shared.is_running();
        let retired = cell.is_retired();
        if let Some(job) = cell.queue.pop() {
            if (!running || retired) && cell.state() == WorkerState::Running {
                cell.set_state(WorkerState::Draining);
            }
            execute(index, job, &shared);
            continue;
        }

        if retired {
            break;
        }

        if let Some(job) = find_work(index, &shared) {
            execute(index, job, &shared);
            continue;
        }

        if !running {
            break;
        }

        thread::yield_now();
    }

    cell.set_state(WorkerState::Exited);
    WORKER_INDEX.with(|slot| slot.set(None));
    debug!(worker = index, "worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_encoding() {
        for state in [WorkerState::Running, WorkerState::Draining, WorkerState::Exited] {
            assert_eq!(WorkerState::from_u8(state.as_u8()), state);
        }
        assert_eq!(WorkerState::Draining.to_string(), "draining");
    }

    #[test]
    fn test_cell_flags() {
        let cell = WorkerCell::new(3);
        assert_eq!(cell.index(), 3);
        assert_eq!(cell.state(), WorkerState::Exited);
        assert!(!cell.is_retired());

        cell.retire();
        assert!(cell.is_retired());
        cell.revive();
        assert!(!cell.is_retired());

        cell.set_state(WorkerState::Running);
        assert_eq!(cell.state(), WorkerState::Running);
    }

    #[test]
    fn test_current_worker_index_off_pool() {
        assert_eq!(current_worker_index(), None);
    }
}
