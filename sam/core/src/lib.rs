#![no_std]
#![forbid(unsafe_code)]

//! # SAM Core
//!
//! Shared building blocks for the SAMD21/SAME54 peripheral drivers: the
//! error type returned by every driver operation, the non-blocking service
//! lock, the sleep gate consulted by the main loop, the byte ring buffer the
//! DMA layer can drain, and the cooperative service loop.

#[cfg(feature = "std")]
extern crate std;

mod fmt;

pub mod lock;
pub mod ring;
pub mod sleep;
pub mod superloop;

pub use lock::ServiceLock;
pub use ring::{CircularBuffer, DmaRing, RingSnapshot};
pub use sleep::SleepGate;
pub use superloop::ServiceLoop;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the peripheral core
pub type PResult<T> = Result<T, PeriphError>;

/// Error types for peripheral core operations
///
/// Every variant maps to a non-zero status code, see [`PeriphError::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriphError {
    /// No free transaction slot, retry later
    QueueFull,
    /// The transaction is being serviced by hardware
    Busy,
    /// No valid transaction with the given id
    NotFound,
    /// The operation is not valid in the current transaction state
    InvalidState,
    /// The transaction is not a session
    NotSession,
    /// A session sub-transfer is already outstanding
    SessionPending,
    /// The ring buffer has nothing to transfer
    EmptyBuffer,
    /// DMA channel number out of range
    InvalidChannel,
    /// Requested baud rate is higher than the clock allows
    BaudUnachievable,
    /// The service lock is held elsewhere
    LockHeld,
}

impl PeriphError {
    /// Numeric status code, always non-zero
    pub const fn code(self) -> u8 {
        match self {
            PeriphError::QueueFull => 1,
            PeriphError::Busy => 2,
            PeriphError::NotFound => 3,
            PeriphError::InvalidState => 4,
            PeriphError::NotSession => 5,
            PeriphError::SessionPending => 6,
            PeriphError::EmptyBuffer => 7,
            PeriphError::InvalidChannel => 8,
            PeriphError::BaudUnachievable => 9,
            PeriphError::LockHeld => 10,
        }
    }
}

impl core::fmt::Display for PeriphError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PeriphError::QueueFull => write!(f, "Transaction queue is full"),
            PeriphError::Busy => write!(f, "Transaction is active"),
            PeriphError::NotFound => write!(f, "No such transaction"),
            PeriphError::InvalidState => write!(f, "Invalid transaction state"),
            PeriphError::NotSession => write!(f, "Transaction is not a session"),
            PeriphError::SessionPending => write!(f, "Session transfer already pending"),
            PeriphError::EmptyBuffer => write!(f, "Ring buffer is empty"),
            PeriphError::InvalidChannel => write!(f, "Invalid DMA channel"),
            PeriphError::BaudUnachievable => write!(f, "Baud rate unachievable"),
            PeriphError::LockHeld => write!(f, "Service lock is held"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PeriphError {}

#[cfg(feature = "defmt")]
impl defmt::Format for PeriphError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            PeriphError::QueueFull => defmt::write!(fmt, "QueueFull"),
            PeriphError::Busy => defmt::write!(fmt, "Busy"),
            PeriphError::NotFound => defmt::write!(fmt, "NotFound"),
            PeriphError::InvalidState => defmt::write!(fmt, "InvalidState"),
            PeriphError::NotSession => defmt::write!(fmt, "NotSession"),
            PeriphError::SessionPending => defmt::write!(fmt, "SessionPending"),
            PeriphError::EmptyBuffer => defmt::write!(fmt, "EmptyBuffer"),
            PeriphError::InvalidChannel => defmt::write!(fmt, "InvalidChannel"),
            PeriphError::BaudUnachievable => defmt::write!(fmt, "BaudUnachievable"),
            PeriphError::LockHeld => defmt::write!(fmt, "LockHeld"),
        }
    }
}
