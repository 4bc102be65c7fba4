//! Error types and handling for the Spindle runtime.
//!
//! Capacity exhaustion and emptiness are ordinary, transient outcomes of the
//! non-blocking channel operations; task failures are deferred into the
//! task's handle; pool errors describe lifecycle problems (spawning threads,
//! submitting after shutdown).

use core::fmt;
use std::io;

use thiserror::Error;

/// Errors returned by channel operations.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Channel is full and cannot accept more items
    #[error("channel is full")]
    Full,
    /// Channel is empty
    #[error("channel is empty")]
    Empty,
    /// A polling wait gave up before an item arrived
    #[error("timed out waiting for an item")]
    Timeout,
}

/// A push that was refused. The rejected value is handed back to the caller.
#[derive(Clone, PartialEq, Eq, Error)]
pub enum PushError<T> {
    /// Every slot is occupied
    #[error("channel is full")]
    Full(T),
}

impl<T> PushError<T> {
    /// Recover the value that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) => value,
        }
    }

    /// The payload-free error kind.
    #[must_use]
    pub fn kind(&self) -> ChannelError {
        match self {
            Self::Full(_) => ChannelError::Full,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
        }
    }
}

/// Errors surfaced when redeeming a task handle.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The task panicked while running
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic message, when the payload was a string
        message: String,
    },
    /// The pool was torn down before the task was executed
    #[error("task was discarded before it ran")]
    Discarded,
}

/// Errors that can occur during pool operations.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been shut down and no longer accepts work
    #[error("pool has been shut down")]
    ShutDown,
    /// The operating system refused to start a worker thread
    #[error("failed to spawn worker {index}")]
    Spawn {
        /// Index of the worker that could not be started
        index: usize,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },
}

/// A result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// A result type for redeemed tasks.
pub type TaskResult<T> = Result<T, TaskError>;

/// A result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
