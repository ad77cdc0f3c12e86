//! Hardware access seam for the DMA controller

/// Interrupt flags of one DMA channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelFlags(u8);

impl ChannelFlags {
    pub const TERR: Self = Self(1 << 0);
    pub const TCMPL: Self = Self(1 << 1);
    pub const SUSP: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Register-level operations on a DMAC instance.
///
/// Production builds bind this to the memory-mapped controller; tests bind
/// it to a software fake. Methods take `&self` because the controller is
/// shared between foreground code and interrupt handlers.
pub trait DmacRegisters {
    /// Software-reset the controller and wait for the reset to finish
    fn reset(&self);

    /// Install the descriptor and write-back table addresses
    fn set_descriptor_tables(&self, base: u32, writeback: u32);

    /// Select round-robin arbitration on every priority level
    fn enable_round_robin(&self);

    /// Enable all priority levels and the controller itself
    fn enable(&self);

    /// Set the controller interrupt priority and unmask it
    fn unmask_interrupt(&self, priority: u8);

    /// Reset `channel`, then program one trigger per beat from `trigger`
    /// at `priority` and enable its transfer-complete interrupt
    fn configure_channel(&self, channel: u8, trigger: u8, priority: u8);

    fn enable_channel(&self, channel: u8);

    fn disable_channel(&self, channel: u8);

    /// True while the channel has a transfer that has not completed: its
    /// transfer-complete interrupt is still enabled or it is the channel
    /// the controller is currently moving data for
    fn channel_busy(&self, channel: u8) -> bool;

    /// Lowest-numbered channel with a pending suspend, complete or error
    /// flag, together with its flags
    fn pending(&self) -> Option<(u8, ChannelFlags)>;

    /// Clear `flags` on `channel` and stop them from raising the interrupt
    fn acknowledge(&self, channel: u8, flags: ChannelFlags);
}

impl<T: DmacRegisters + ?Sized> DmacRegisters for &T {
    fn reset(&self) {
        (**self).reset()
    }

    fn set_descriptor_tables(&self, base: u32, writeback: u32) {
        (**self).set_descriptor_tables(base, writeback)
    }

    fn enable_round_robin(&self) {
        (**self).enable_round_robin()
    }

    fn enable(&self) {
        (**self).enable()
    }

    fn unmask_interrupt(&self, priority: u8) {
        (**self).unmask_interrupt(priority)
    }

    fn configure_channel(&self, channel: u8, trigger: u8, priority: u8) {
        (**self).configure_channel(channel, trigger, priority)
    }

    fn enable_channel(&self, channel: u8) {
        (**self).enable_channel(channel)
    }

    fn disable_channel(&self, channel: u8) {
        (**self).disable_channel(channel)
    }

    fn channel_busy(&self, channel: u8) -> bool {
        (**self).channel_busy(channel)
    }

    fn pending(&self) -> Option<(u8, ChannelFlags)> {
        (**self).pending()
    }

    fn acknowledge(&self, channel: u8, flags: ChannelFlags) {
        (**self).acknowledge(channel, flags)
    }
}
