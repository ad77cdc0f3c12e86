#![no_std]
#![forbid(unsafe_code)]

//! # SAM SPI
//!
//! Transaction-queued SPI master for a SAMD21/SAME54 SERCOM.
//!
//! Independent device drivers share one bus by queueing transactions; the
//! driver starts them one at a time and reports completion through
//! [`SercomSpi::transaction_done`] or an optional callback. A transaction has
//! an out stage and an in stage, either of which may be empty:
//!
//! - With DMA channels for both directions the whole transaction runs as one
//!   full-duplex DMA pair. The TX chain sends the out bytes then dummy bytes,
//!   the RX chain sinks the bytes clocked in during the out stage then fills
//!   the input buffer.
//! - Otherwise the missing direction is stepped by the DRE, TXC and RXC
//!   interrupts.
//!
//! Multi-part transactions and sessions keep the chip select asserted across
//! several transfers. A session also holds the head of the queue so nothing
//! else reaches the bus until [`SercomSpi::end_session`].
//!
//! ```text
//! start() -> service() -> [DMA | DRE..TXC] -> [RXC..] -> end -> callback
//! ```

mod fmt;

pub mod config;
pub mod driver;
pub mod transaction;

pub use config::{SpiConfig, SPI_BAUD_FALLBACK, SPI_DEFAULT_CORE_FREQUENCY};
pub use driver::SercomSpi;
pub use transaction::{ChipSelect, SpiCallback, SpiPart};

/// Default depth of the SPI transaction queue
pub const SPI_QUEUE_LENGTH: usize = 16;
