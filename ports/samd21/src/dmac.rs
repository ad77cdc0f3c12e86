//! DMAC register block

use sam_dma::{ChannelFlags, DmacRegisters};

use crate::mmio::Mmio;
use crate::nvic::{self, DMAC_IRQ};

pub const DMAC_BASE: usize = 0x4100_4800;

const CTRL: usize = 0x00;
const PRICTRL0: usize = 0x14;
const INTPEND: usize = 0x20;
const ACTIVE: usize = 0x30;
const BASEADDR: usize = 0x34;
const WRBADDR: usize = 0x38;
const CHID: usize = 0x3F;
const CHCTRLA: usize = 0x40;
const CHCTRLB: usize = 0x44;
const CHINTENCLR: usize = 0x4C;
const CHINTENSET: usize = 0x4D;
const CHINTFLAG: usize = 0x4E;

const CTRL_SWRST: u16 = 1 << 0;
const CTRL_DMAENABLE: u16 = 1 << 1;
const CTRL_LVLEN_ALL: u16 = 0xF << 8;

const PRICTRL0_RRLVLEN_ALL: u32 = (1 << 7) | (1 << 15) | (1 << 23) | (1 << 31);

const INTPEND_ID_MASK: u16 = 0xF;
/// TERR, TCMPL and SUSP sit in the same order as in CHINTFLAG
const INTPEND_FLAGS_SHIFT: u16 = 8;

const ACTIVE_ID_SHIFT: u32 = 8;
const ACTIVE_ID_MASK: u32 = 0x1F;
const ACTIVE_ABUSY: u32 = 1 << 15;

const CHCTRLA_SWRST: u8 = 1 << 0;
const CHCTRLA_ENABLE: u8 = 1 << 1;

const CHCTRLB_LVL_SHIFT: u32 = 5;
const CHCTRLB_TRIGSRC_SHIFT: u32 = 8;
const CHCTRLB_TRIGACT_SHIFT: u32 = 22;
const TRIGACT_BEAT: u32 = 0x2;

/// CHCTRLB value for one beat per trigger
pub const fn chctrlb(trigger: u8, priority: u8) -> u32 {
    ((priority as u32 & 0x3) << CHCTRLB_LVL_SHIFT)
        | ((trigger as u32 & 0x3F) << CHCTRLB_TRIGSRC_SHIFT)
        | (TRIGACT_BEAT << CHCTRLB_TRIGACT_SHIFT)
}

#[derive(Debug)]
pub struct Samd21Dmac {
    regs: Mmio,
}

impl Samd21Dmac {
    pub const fn new() -> Self {
        Self {
            regs: Mmio::new(DMAC_BASE),
        }
    }

    /// Run `f` with `channel` selected through CHID
    fn with_channel<R>(&self, channel: u8, f: impl FnOnce(Mmio) -> R) -> R {
        critical_section::with(|_| {
            self.regs.write8(CHID, channel);
            f(self.regs)
        })
    }
}

impl Default for Samd21Dmac {
    fn default() -> Self {
        Self::new()
    }
}

impl DmacRegisters for Samd21Dmac {
    fn reset(&self) {
        self.regs.write16(CTRL, 0);
        self.regs.write16(CTRL, CTRL_SWRST);
        while self.regs.read16(CTRL) & CTRL_SWRST != 0 {}
    }

    fn set_descriptor_tables(&self, base: u32, writeback: u32) {
        self.regs.write32(BASEADDR, base);
        self.regs.write32(WRBADDR, writeback);
    }

    fn enable_round_robin(&self) {
        self.regs.write32(PRICTRL0, PRICTRL0_RRLVLEN_ALL);
    }

    fn enable(&self) {
        self.regs.write16(CTRL, CTRL_DMAENABLE | CTRL_LVLEN_ALL);
    }

    fn unmask_interrupt(&self, priority: u8) {
        nvic::unmask(DMAC_IRQ, priority);
    }

    fn configure_channel(&self, channel: u8, trigger: u8, priority: u8) {
        self.with_channel(channel, |regs| {
            regs.write8(CHCTRLA, 0);
            regs.write8(CHCTRLA, CHCTRLA_SWRST);
            while regs.read8(CHCTRLA) & CHCTRLA_SWRST != 0 {}
            regs.write32(CHCTRLB, chctrlb(trigger, priority));
            regs.write8(CHINTENSET, ChannelFlags::TCMPL.bits());
        });
    }

    fn enable_channel(&self, channel: u8) {
        self.with_channel(channel, |regs| regs.write8(CHCTRLA, CHCTRLA_ENABLE));
    }

    fn disable_channel(&self, channel: u8) {
        self.with_channel(channel, |regs| regs.write8(CHCTRLA, 0));
    }

    fn channel_busy(&self, channel: u8) -> bool {
        let armed = self.with_channel(channel, |regs| {
            regs.read8(CHINTENSET) & ChannelFlags::TCMPL.bits() != 0
        });
        let active = self.regs.read32(ACTIVE);
        armed
            || (active & ACTIVE_ABUSY != 0
                && (active >> ACTIVE_ID_SHIFT) & ACTIVE_ID_MASK == channel as u32)
    }

    fn pending(&self) -> Option<(u8, ChannelFlags)> {
        let intpend = self.regs.read16(INTPEND);
        let flags = ChannelFlags::from_bits((intpend >> INTPEND_FLAGS_SHIFT) as u8);
        if flags.is_empty() {
            None
        } else {
            Some(((intpend & INTPEND_ID_MASK) as u8, flags))
        }
    }

    fn acknowledge(&self, channel: u8, flags: ChannelFlags) {
        self.with_channel(channel, |regs| {
            regs.write8(CHINTENCLR, flags.bits());
            regs.write8(CHINTFLAG, flags.bits());
        });
    }
}
