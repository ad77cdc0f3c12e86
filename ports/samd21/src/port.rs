//! PORT output set and clear registers

use sam_sercom::PortRegisters;

use crate::mmio::Mmio;

pub const PORT_BASE: usize = 0x4100_4400;

const GROUP_STRIDE: usize = 0x80;
const OUTCLR: usize = 0x14;
const OUTSET: usize = 0x18;

#[derive(Debug)]
pub struct Samd21Port {
    regs: Mmio,
}

impl Samd21Port {
    pub const fn new() -> Self {
        Self {
            regs: Mmio::new(PORT_BASE),
        }
    }

    const fn group_offset(group: u8) -> usize {
        group as usize * GROUP_STRIDE
    }
}

impl Default for Samd21Port {
    fn default() -> Self {
        Self::new()
    }
}

impl PortRegisters for Samd21Port {
    fn set_pins(&self, group: u8, mask: u32) {
        self.regs.write32(Self::group_offset(group) + OUTSET, mask);
    }

    fn clear_pins(&self, group: u8, mask: u32) {
        self.regs.write32(Self::group_offset(group) + OUTCLR, mask);
    }
}
