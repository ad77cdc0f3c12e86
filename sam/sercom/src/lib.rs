#![no_std]
#![forbid(unsafe_code)]

//! # SAM SERCOM
//!
//! Pieces shared by the SERCOM SPI and I2C drivers: the register-level
//! traits each driver is written against, baud register calculators, DMA
//! trigger numbers per instance and the registry that routes a SERCOM
//! interrupt vector to the driver owning the instance.

mod fmt;

pub mod baud;
pub mod handlers;
pub mod regs;

pub use baud::{calc_async_baud, calc_i2c_baud, calc_sync_baud, I2cBaud, I2cMode, SampleRate};
pub use handlers::{SercomHandler, SercomHandlers, SercomIsr};
pub use regs::{
    BusState, I2cCommand, I2cRegisters, I2cStatus, PortRegisters, SercomInterrupts, SpiRegisters,
};

/// NVIC priority of SERCOM interrupts
pub const SERCOM_IRQ_PRIORITY: u8 = 1;

/// DMA priority level of SERCOM transmit channels
pub const SERCOM_DMA_TX_PRIORITY: u8 = 1;

/// DMA priority level of SERCOM receive channels
pub const SERCOM_DMA_RX_PRIORITY: u8 = 2;

/// Number of SERCOM instances on the SAMD21
pub const SAMD21_SERCOM_COUNT: usize = 6;

/// One SERCOM instance of a SAMD21
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SercomInstance(u8);

impl SercomInstance {
    /// `None` if the part has no instance `n`
    pub const fn new(n: u8) -> Option<Self> {
        if (n as usize) < SAMD21_SERCOM_COUNT {
            Some(Self(n))
        } else {
            None
        }
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    /// DMAC trigger raised when the instance has received a byte
    pub const fn dma_rx_trigger(self) -> u8 {
        0x01 + 2 * self.0
    }

    /// DMAC trigger raised when the instance can accept a byte
    pub const fn dma_tx_trigger(self) -> u8 {
        0x02 + 2 * self.0
    }
}
