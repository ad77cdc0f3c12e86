#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! # SAMD21 port
//!
//! Binds the register seams of `sam-dma` and `sam-sercom` to the memory
//! mapped peripherals of the SAMD21. Every accessor is a volatile read or
//! write at a fixed address. The DMAC channel registers sit behind the CHID
//! selector, so each channel access selects and uses it inside one critical
//! section.
//!
//! Enable the `rt` feature on the final binary to get the single-core
//! critical-section implementation from `cortex-m`.

mod mmio;

pub mod dmac;
pub mod nvic;
pub mod port;
pub mod sercom;

pub use dmac::{Samd21Dmac, DMAC_BASE};
pub use nvic::{sercom_irq, Irq, DMAC_IRQ};
pub use port::{Samd21Port, PORT_BASE};
pub use sercom::{sercom_base, Samd21I2c, Samd21Spi};

/// The register blocks that exist once per chip
#[derive(Debug)]
pub struct Samd21Peripherals {
    pub dmac: Samd21Dmac,
    pub port: Samd21Port,
}

impl Samd21Peripherals {
    pub const fn new() -> Self {
        Self {
            dmac: Samd21Dmac::new(),
            port: Samd21Port::new(),
        }
    }
}

impl Default for Samd21Peripherals {
    fn default() -> Self {
        Self::new()
    }
}
