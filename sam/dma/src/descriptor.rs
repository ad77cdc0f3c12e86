//! DMAC transfer descriptors

/// Block transfer control register bits
pub mod btctrl {
    pub const VALID: u16 = 1 << 0;
    pub const BLOCKACT_SHIFT: u16 = 3;
    pub const BLOCKACT_MASK: u16 = 0b11 << BLOCKACT_SHIFT;
    /// Channel disabled after the block, no interrupt
    pub const BLOCKACT_NOACT: u16 = 0 << BLOCKACT_SHIFT;
    /// Channel disabled after the block and a block interrupt raised
    pub const BLOCKACT_INT: u16 = 1 << BLOCKACT_SHIFT;
    pub const BEATSIZE_SHIFT: u16 = 8;
    pub const BEATSIZE_MASK: u16 = 0b11 << BEATSIZE_SHIFT;
    pub const SRCINC: u16 = 1 << 10;
    pub const DSTINC: u16 = 1 << 11;
    /// Step size applies to the destination address
    pub const STEPSEL_DST: u16 = 0 << 12;
}

/// Size of one beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DmaWidth {
    Byte = 0,
    HalfWord = 1,
    Word = 2,
}

impl DmaWidth {
    /// Number of bytes moved per beat
    pub const fn bytes(self) -> u32 {
        1 << (self as u32)
    }

    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => DmaWidth::Byte,
            1 => DmaWidth::HalfWord,
            _ => DmaWidth::Word,
        }
    }
}

/// One hardware transfer descriptor, laid out as the DMAC reads it
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmacDescriptor {
    pub btctrl: u16,
    pub btcnt: u16,
    pub srcaddr: u32,
    pub dstaddr: u32,
    pub descaddr: u32,
}

impl DmacDescriptor {
    /// A descriptor with the valid bit clear
    pub const EMPTY: Self = Self {
        btctrl: 0,
        btcnt: 0,
        srcaddr: 0,
        dstaddr: 0,
        descaddr: 0,
    };

    pub const fn is_valid(&self) -> bool {
        self.btctrl & btctrl::VALID != 0
    }

    /// True when completing this block raises the channel interrupt
    pub const fn interrupts_on_block(&self) -> bool {
        self.btctrl & btctrl::BLOCKACT_MASK == btctrl::BLOCKACT_INT
    }

    pub fn width(&self) -> DmaWidth {
        DmaWidth::from_bits(self.btctrl >> btctrl::BEATSIZE_SHIFT)
    }

    pub const fn increments_source(&self) -> bool {
        self.btctrl & btctrl::SRCINC != 0
    }

    pub const fn increments_destination(&self) -> bool {
        self.btctrl & btctrl::DSTINC != 0
    }

    /// Address of the first source beat, undoing the end-of-block offset
    pub fn source_start(&self) -> u32 {
        if self.increments_source() {
            self.srcaddr.wrapping_sub(self.block_bytes())
        } else {
            self.srcaddr
        }
    }

    /// Address of the first destination beat, undoing the end-of-block offset
    pub fn destination_start(&self) -> u32 {
        if self.increments_destination() {
            self.dstaddr.wrapping_sub(self.block_bytes())
        } else {
            self.dstaddr
        }
    }

    fn block_bytes(&self) -> u32 {
        self.btcnt as u32 * self.width().bytes()
    }

    /// Address of the chained descriptor, `None` at the end of a chain
    pub const fn next(&self) -> Option<u32> {
        if self.descaddr == 0 {
            None
        } else {
            Some(self.descaddr)
        }
    }
}

/// One block of a DMA transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Block {
    pub width: DmaWidth,
    pub source: u32,
    pub increment_source: bool,
    pub destination: u32,
    pub increment_destination: bool,
    /// Number of beats
    pub length: u16,
}

impl Block {
    /// Byte block from an incrementing buffer to a fixed register
    pub const fn to_register(source: u32, register: u32, length: u16) -> Self {
        Self {
            width: DmaWidth::Byte,
            source,
            increment_source: true,
            destination: register,
            increment_destination: false,
            length,
        }
    }

    /// Byte block from a fixed register to an incrementing buffer
    pub const fn from_register(register: u32, destination: u32, length: u16) -> Self {
        Self {
            width: DmaWidth::Byte,
            source: register,
            increment_source: false,
            destination,
            increment_destination: true,
            length,
        }
    }

    /// Byte block between two fixed addresses
    pub const fn fixed(source: u32, destination: u32, length: u16) -> Self {
        Self {
            width: DmaWidth::Byte,
            source,
            increment_source: false,
            destination,
            increment_destination: false,
            length,
        }
    }
}

/// Fill in `desc` for `block`.
///
/// The DMAC expects incrementing addresses to point one past the end of the
/// block, so `length * beat_size` is added to them. A descriptor without a
/// `next` address ends the chain and raises the block interrupt; chained
/// descriptors leave the interrupt to the final one.
pub fn config_descriptor(desc: &mut DmacDescriptor, block: &Block, next: Option<u32>) {
    let mut ctrl = ((block.width as u16) << btctrl::BEATSIZE_SHIFT)
        | btctrl::VALID
        | btctrl::STEPSEL_DST
        | if next.is_none() {
            btctrl::BLOCKACT_INT
        } else {
            btctrl::BLOCKACT_NOACT
        };
    if block.increment_source {
        ctrl |= btctrl::SRCINC;
    }
    if block.increment_destination {
        ctrl |= btctrl::DSTINC;
    }

    let span = block.length as u32 * block.width.bytes();
    desc.btctrl = ctrl;
    let src_span = if block.increment_source { span } else { 0 };
    let dst_span = if block.increment_destination { span } else { 0 };
    desc.srcaddr = block.source.wrapping_add(src_span);
    desc.dstaddr = block.destination.wrapping_add(dst_span);
    desc.btcnt = block.length;
    desc.descaddr = next.unwrap_or(0);
}
