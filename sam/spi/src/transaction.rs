//! Per-transaction SPI state

use sam_sercom::PortRegisters;

/// Chip select line, driven low for the duration of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipSelect {
    pub group: u8,
    pub mask: u32,
}

impl ChipSelect {
    /// No chip select line, for devices with CS tied low or driven elsewhere
    pub const NONE: Self = Self {
        group: 0xFF,
        mask: 0,
    };

    pub const fn new(group: u8, mask: u32) -> Self {
        Self { group, mask }
    }

    pub const fn is_none(&self) -> bool {
        self.group == Self::NONE.group
    }

    pub(crate) fn assert<P: PortRegisters>(&self, port: &P) {
        if !self.is_none() {
            port.clear_pins(self.group, self.mask);
        }
    }

    pub(crate) fn release<P: PortRegisters>(&self, port: &P) {
        if !self.is_none() {
            port.set_pins(self.group, self.mask);
        }
    }
}

impl Default for ChipSelect {
    fn default() -> Self {
        Self::NONE
    }
}

/// Completion callback, run from interrupt context with `context`
#[derive(Debug, Clone, Copy)]
pub struct SpiCallback {
    pub func: fn(usize),
    pub context: usize,
}

impl SpiCallback {
    pub const fn new(func: fn(usize), context: usize) -> Self {
        Self { func, context }
    }
}

/// One part of a multi-part transaction
#[derive(Debug)]
pub struct SpiPart<'d> {
    pub out: &'d [u8],
    pub input: &'d mut [u8],
    pub baud: u32,
}

impl<'d> SpiPart<'d> {
    pub fn new(baud: u32, out: &'d [u8], input: &'d mut [u8]) -> Self {
        Self { out, input, baud }
    }
}

/// How a queued transaction relates to the chip select around it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum SpiKind {
    /// Asserts CS, transfers, releases CS
    #[default]
    Single,
    /// Part of a multi-part transfer. CS stays asserted and `next` runs
    /// straight after this part; the last part has no `next` and releases CS.
    Chained { next: Option<u8> },
    /// Session entry, reloaded with sub-transfers until the session ends.
    /// `simultaneous` sub-transfers clock `out` while receiving.
    Session { simultaneous: bool },
}

impl SpiKind {
    pub fn is_session(self) -> bool {
        matches!(self, Self::Session { .. })
    }

    pub fn is_simultaneous(self) -> bool {
        matches!(self, Self::Session { simultaneous: true })
    }

    /// Part that runs next under the same CS assertion
    pub fn chained_next(self) -> Option<u8> {
        match self {
            Self::Chained { next } => next,
            _ => None,
        }
    }
}

/// Queue payload of the SPI driver
#[derive(Debug, Default)]
pub(crate) struct SpiTransaction<'d> {
    pub out: &'d [u8],
    pub input: &'d mut [u8],
    pub out_length: u16,
    pub in_length: u16,
    pub bytes_out: u16,
    pub bytes_in: u16,
    pub dummy_bytes_out: u16,
    pub baud: u32,
    pub cs: ChipSelect,
    pub rx_started: bool,
    pub kind: SpiKind,
    pub callback: Option<SpiCallback>,
}

impl<'d> SpiTransaction<'d> {
    pub fn new(baud: u32, cs: ChipSelect) -> Self {
        Self {
            baud,
            cs,
            ..Self::default()
        }
    }

    /// Load the buffers of the next transfer and rewind the byte counters
    pub fn load(&mut self, out: &'d [u8], out_length: u16, input: &'d mut [u8], in_length: u16) {
        self.out = out;
        self.input = input;
        self.out_length = out_length;
        self.in_length = in_length;
        self.bytes_out = 0;
        self.bytes_in = 0;
        self.dummy_bytes_out = 0;
        self.rx_started = false;
        if let SpiKind::Session { simultaneous } = &mut self.kind {
            *simultaneous = false;
        }
        self.callback = None;
    }

    /// Move the borrowed buffers out, leaving empty ones
    pub fn take_buffers(&mut self) -> (&'d [u8], &'d mut [u8]) {
        (
            core::mem::take(&mut self.out),
            core::mem::take(&mut self.input),
        )
    }
}
