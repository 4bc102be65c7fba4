//! Task handles: the result slot a submitter redeems once its task has run.
//!
//! A handle and its [`Completer`] are created as a pair. The completer travels
//! with the job into a worker queue; whichever worker runs the job settles the
//! handle with the task's value or with the panic it raised. If the job is
//! dropped without running, the handle resolves to [`TaskError::Discarded`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::{TaskError, TaskResult};
use crate::{Job, TaskId};

/// Settled state of a task as seen by its handle.
enum Settled<T> {
    Done(T),
    Panicked(Box<dyn Any + Send + 'static>),
    Discarded,
}

impl<T> Settled<T> {
    fn from_outcome(outcome: Result<thread::Result<T>, mpsc::RecvError>) -> Self {
        match outcome {
            Ok(Ok(value)) => Self::Done(value),
            Ok(Err(payload)) => Self::Panicked(payload),
            Err(mpsc::RecvError) => Self::Discarded,
        }
    }

    fn into_result(self) -> TaskResult<T> {
        match self {
            Self::Done(value) => Ok(value),
            Self::Panicked(payload) => Err(TaskError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
            Self::Discarded => Err(TaskError::Discarded),
        }
    }
}

/// Extract a human readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// The write side of a task handle.
pub struct Completer<T> {
    sender: mpsc::SyncSender<thread::Result<T>>,
}

impl<T> Completer<T> {
    /// Settle the paired handle. A handle that was already dropped is ignored.
    pub fn complete(self, outcome: thread::Result<T>) {
        let _ = self.sender.send(outcome);
    }
}

/// A handle to a submitted task, redeemable for its result.
#[must_use = "dropping a TaskHandle detaches the task; its result is discarded"]
pub struct TaskHandle<T> {
    id: TaskId,
    receiver: mpsc::Receiver<thread::Result<T>>,
    settled: Option<Settled<T>>,
}

impl<T> TaskHandle<T> {
    /// Create a connected completer/handle pair for task `id`.
    #[must_use]
    pub fn pair(id: TaskId) -> (Completer<T>, Self) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (
            Completer { sender },
            Self {
                id,
                receiver,
                settled: None,
            },
        )
    }

    /// Returns the task ID.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Block until the task has run and return its result.
    ///
    /// # Errors
    ///
    /// [`TaskError::Panicked`] if the task panicked, [`TaskError::Discarded`]
    /// if it was dropped without running.
    pub fn join(mut self) -> TaskResult<T> {
        self.wait().into_result()
    }

    /// Block until the task has run. A panic inside the task is re-raised on
    /// the calling thread with its original payload.
    ///
    /// # Panics
    ///
    /// Re-raises the task's panic, and panics if the task was discarded.
    pub fn join_or_resume(mut self) -> T {
        match self.wait() {
            Settled::Done(value) => value,
            Settled::Panicked(payload) => panic::resume_unwind(payload),
            Settled::Discarded => panic!("{} was discarded before it ran", self.id),
        }
    }

    /// Wait at most `timeout` for the task. On timeout the handle is returned
    /// so the caller can keep waiting later.
    ///
    /// # Errors
    ///
    /// Returns `Err(self)` when the task has not settled within `timeout`.
    pub fn join_timeout(mut self, timeout: Duration) -> Result<TaskResult<T>, Self> {
        if let Some(settled) = self.settled.take() {
            return Ok(settled.into_result());
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Ok(Settled::from_outcome(Ok(outcome)).into_result()),
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Err(TaskError::Discarded)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(self),
        }
    }

    /// Non-blocking check whether the task has settled (ran, panicked, or was
    /// discarded). The settled value is kept for a later `join`.
    pub fn is_finished(&mut self) -> bool {
        if self.settled.is_some() {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(outcome) => {
                self.settled = Some(Settled::from_outcome(Ok(outcome)));
                true
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                self.settled = Some(Settled::Discarded);
                true
            }
            Err(mpsc::TryRecvError::Empty) => false,
        }
    }

    fn wait(&mut self) -> Settled<T> {
        match self.settled.take() {
            Some(settled) => settled,
            None => Settled::from_outcome(self.receiver.recv()),
        }
    }
}

impl<T> core::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("settled", &self.settled.is_some())
            .finish()
    }
}

/// Wrap `func` into a [`Job`] that settles the returned handle when run.
///
/// A panic inside `func` is caught, reported through `on_panic`, and stored in
/// the handle; the job itself never unwinds.
pub fn package<F, R, P>(id: TaskId, func: F, on_panic: P) -> (Job, TaskHandle<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
    P: FnOnce() + Send + 'static,
{
    let (completer, handle) = TaskHandle::pair(id);
    let job: Job = Box::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(func));
        if outcome.is_err() {
            on_panic();
        }
        completer.complete(outcome);
    });
    (job, handle)
}
