#![no_std]
#![forbid(unsafe_code)]

//! # SAM DMA
//!
//! DMAC layer for the SAMD21/SAME54 drivers. It writes transfer descriptors,
//! chains up to two blocks per channel, drains ring buffers into fixed
//! peripheral registers, and turns channel interrupts into [`DmaEvent`]s and
//! registered completion callbacks.
//!
//! Drivers reach the controller through the [`DmaEngine`] trait so they can
//! be tested against a fake controller.

mod fmt;

pub mod controller;
pub mod descriptor;
pub mod regs;
pub mod ring;

pub use controller::{Dmac, DmacConfig, DMA_IRQ_PRIORITY};
pub use descriptor::{config_descriptor, Block, DmaWidth, DmacDescriptor};
pub use regs::{ChannelFlags, DmacRegisters};
pub use ring::RingSplit;

use sam_core::PResult;

/// Number of DMA channels on the SAMD21
pub const SAMD21_DMA_CHANNELS: usize = 12;

/// Outcome reported for one channel by the controller interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaEvent {
    /// The last block of the chain finished and the channel was disabled
    Complete(u8),
    /// The channel suspended itself
    Suspended(u8),
    /// The controller hit a bus error on the channel
    TransferError(u8),
}

impl DmaEvent {
    pub const fn channel(&self) -> u8 {
        match *self {
            DmaEvent::Complete(ch) | DmaEvent::Suspended(ch) | DmaEvent::TransferError(ch) => ch,
        }
    }
}

/// Completion callback: called with the channel number and `context`
#[derive(Debug, Clone, Copy)]
pub struct DmaCallback {
    pub func: fn(u8, usize),
    pub context: usize,
}

impl DmaCallback {
    pub const fn new(func: fn(u8, usize), context: usize) -> Self {
        Self { func, context }
    }
}

/// Channel, trigger source and priority used by one direction of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaChannelConfig {
    pub channel: u8,
    pub trigger: u8,
    pub priority: u8,
}

impl DmaChannelConfig {
    pub const fn new(channel: u8, trigger: u8, priority: u8) -> Self {
        Self {
            channel,
            trigger,
            priority,
        }
    }
}

/// Transfer operations a driver needs from the DMA controller
pub trait DmaEngine {
    /// Configure `channel` and start moving `first`, followed by `then` when
    /// given. Completion of the last block is reported once.
    fn start_transfer(
        &self,
        channel: u8,
        first: &Block,
        then: Option<&Block>,
        trigger: u8,
        priority: u8,
    ) -> PResult<()>;

    /// Stop `channel` without reporting completion
    fn abort_transfer(&self, channel: u8);

    /// True while `channel` has an unfinished transfer
    fn chan_is_active(&self, channel: u8) -> bool;
}

impl<T: DmaEngine + ?Sized> DmaEngine for &T {
    fn start_transfer(
        &self,
        channel: u8,
        first: &Block,
        then: Option<&Block>,
        trigger: u8,
        priority: u8,
    ) -> PResult<()> {
        (**self).start_transfer(channel, first, then, trigger, priority)
    }

    fn abort_transfer(&self, channel: u8) {
        (**self).abort_transfer(channel)
    }

    fn chan_is_active(&self, channel: u8) -> bool {
        (**self).chan_is_active(channel)
    }
}
