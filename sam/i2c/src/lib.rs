#![no_std]
#![forbid(unsafe_code)]

//! # SAM I2C
//!
//! Transaction-queued I2C master for a SAMD21/SAME54 SERCOM in smart mode.
//!
//! Four kinds of transaction share the queue:
//!
//! - generic: write an out buffer, then read an in buffer after a repeated
//!   start
//! - register write: the register address byte followed by data
//! - register read: the register address byte, then a read
//! - scan: probe every 7-bit address and record which ones acknowledge
//!
//! A stage moves through the driver's DMA channel when it is long enough;
//! otherwise the master-on-bus and slave-on-bus interrupts step it a byte at
//! a time. Transport failures end the transaction in an error state the
//! caller reads back with [`SercomI2c::transaction_state`]; nothing is
//! retried.
//!
//! ```text
//! Pending -> [RegAddr ->] Tx -> [WaitForRx ->] Rx -> [WaitForDone ->] Done
//! ```

mod fmt;

pub mod config;
pub mod driver;
pub mod transaction;

pub use config::{I2cConfig, I2cDmaConfig, I2C_DEFAULT_CORE_FREQUENCY, I2C_DMA_MAX, I2C_DMA_THRESHOLD};
pub use driver::SercomI2c;
pub use sam_sercom::I2cMode;
pub use transaction::{I2cBuffers, I2cCallback, I2cState};

/// Default depth of the I2C transaction queue
pub const I2C_QUEUE_LENGTH: usize = 12;
