//! Fake DMA controller

use std::cell::{Cell, RefCell};

use sam_dma::{ChannelFlags, DmacRegisters};

/// Recorded state of one fake channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FakeChannel {
    pub trigger: u8,
    pub priority: u8,
    pub enabled: bool,
    /// Transfer-complete interrupt enabled, cleared by acknowledging it
    pub complete_armed: bool,
    pub flags: ChannelFlags,
    /// Number of times the channel was enabled
    pub starts: u32,
}

/// DMAC fake with 32 channels
#[derive(Debug, Default)]
pub struct FakeDmac {
    channels: RefCell<[FakeChannel; 32]>,
    resets: Cell<u32>,
    tables: Cell<Option<(u32, u32)>>,
    round_robin: Cell<bool>,
    enabled: Cell<bool>,
    irq_priority: Cell<Option<u8>>,
}

impl FakeDmac {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, channel: u8) -> FakeChannel {
        self.channels.borrow()[channel as usize]
    }

    /// Raise `flags` on `channel` as the hardware would
    pub fn raise(&self, channel: u8, flags: ChannelFlags) {
        let mut channels = self.channels.borrow_mut();
        let ch = &mut channels[channel as usize];
        ch.flags = ch.flags.union(flags);
        if flags.contains(ChannelFlags::TCMPL) {
            ch.enabled = false;
        }
    }

    /// Finish the transfer running on `channel`
    pub fn complete(&self, channel: u8) {
        self.raise(channel, ChannelFlags::TCMPL);
    }

    pub fn resets(&self) -> u32 {
        self.resets.get()
    }

    pub fn tables(&self) -> Option<(u32, u32)> {
        self.tables.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get() && self.round_robin.get()
    }

    pub fn irq_priority(&self) -> Option<u8> {
        self.irq_priority.get()
    }
}

impl DmacRegisters for FakeDmac {
    fn reset(&self) {
        self.resets.set(self.resets.get() + 1);
        *self.channels.borrow_mut() = [FakeChannel::default(); 32];
        self.enabled.set(false);
    }

    fn set_descriptor_tables(&self, base: u32, writeback: u32) {
        self.tables.set(Some((base, writeback)));
    }

    fn enable_round_robin(&self) {
        self.round_robin.set(true);
    }

    fn enable(&self) {
        self.enabled.set(true);
    }

    fn unmask_interrupt(&self, priority: u8) {
        self.irq_priority.set(Some(priority));
    }

    fn configure_channel(&self, channel: u8, trigger: u8, priority: u8) {
        let mut channels = self.channels.borrow_mut();
        let ch = &mut channels[channel as usize];
        *ch = FakeChannel {
            trigger,
            priority,
            complete_armed: true,
            starts: ch.starts,
            ..FakeChannel::default()
        };
    }

    fn enable_channel(&self, channel: u8) {
        let mut channels = self.channels.borrow_mut();
        let ch = &mut channels[channel as usize];
        ch.enabled = true;
        ch.starts += 1;
    }

    fn disable_channel(&self, channel: u8) {
        self.channels.borrow_mut()[channel as usize].enabled = false;
    }

    fn channel_busy(&self, channel: u8) -> bool {
        self.channels.borrow()[channel as usize].complete_armed
    }

    fn pending(&self) -> Option<(u8, ChannelFlags)> {
        self.channels
            .borrow()
            .iter()
            .position(|ch| !ch.flags.is_empty())
            .map(|i| (i as u8, self.channels.borrow()[i].flags))
    }

    fn acknowledge(&self, channel: u8, flags: ChannelFlags) {
        let mut channels = self.channels.borrow_mut();
        let ch = &mut channels[channel as usize];
        ch.flags = ChannelFlags::from_bits(ch.flags.bits() & !flags.bits());
        if flags.contains(ChannelFlags::TCMPL) {
            ch.complete_armed = false;
        }
    }
}
