//! Producer concurrency modes.

use core::fmt;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Spsc {}
    impl Sealed for super::Mpsc {}
}

/// Runtime description of a channel's producer mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    /// Single producer, single consumer
    Spsc,
    /// Multiple producers, single consumer
    Mpsc,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spsc => write!(f, "SPSC"),
            Self::Mpsc => write!(f, "MPSC"),
        }
    }
}

/// Type-level producer mode of a [`BoundedChannel`](crate::BoundedChannel).
///
/// Sealed: the only modes are [`Spsc`] and [`Mpsc`].
pub trait Mode: sealed::Sealed + Send + Sync + 'static {
    /// Whether producers must serialise their slot reservations.
    const MULTI_PRODUCER: bool;
    /// The runtime tag for this mode.
    const KIND: ChannelMode;
}

/// Single-producer mode. The producer end cannot be cloned.
#[derive(Debug)]
pub enum Spsc {}

/// Multi-producer mode. The producer end is `Clone`; reservations are
/// serialised by a spinlock.
#[derive(Debug)]
pub enum Mpsc {}

impl Mode for Spsc {
    const MULTI_PRODUCER: bool = false;
    const KIND: ChannelMode = ChannelMode::Spsc;
}

impl Mode for Mpsc {
    const MULTI_PRODUCER: bool = true;
    const KIND: ChannelMode = ChannelMode::Mpsc;
}
