//! I2C transaction payloads and states

use core::mem;

/// Progress of an I2C transaction.
///
/// ```text
/// Pending -> [RegAddr ->] Tx -> [WaitForRx ->] Rx -> [WaitForDone ->] Done
/// ```
///
/// `BusError`, `ArbitrationLost` and `SlaveNack` are terminal as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cState {
    #[default]
    Pending,
    /// Sending the register address of a register access
    RegAddr,
    Tx,
    /// DMA sent the out stage, the bus has to go idle before reading
    WaitForRx,
    Rx,
    /// DMA finished, the bus has to go idle before the transaction ends
    WaitForDone,
    Done,
    BusError,
    ArbitrationLost,
    SlaveNack,
}

impl I2cState {
    /// The transaction has ended, successfully or not
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            I2cState::Done | I2cState::BusError | I2cState::ArbitrationLost | I2cState::SlaveNack
        )
    }

    pub const fn is_error(self) -> bool {
        matches!(
            self,
            I2cState::BusError | I2cState::ArbitrationLost | I2cState::SlaveNack
        )
    }
}

impl core::fmt::Display for I2cState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            I2cState::Pending => "pending",
            I2cState::RegAddr => "register address",
            I2cState::Tx => "tx",
            I2cState::WaitForRx => "wait for rx",
            I2cState::Rx => "rx",
            I2cState::WaitForDone => "wait for done",
            I2cState::Done => "done",
            I2cState::BusError => "bus error",
            I2cState::ArbitrationLost => "arbitration lost",
            I2cState::SlaveNack => "slave nack",
        };
        f.write_str(name)
    }
}

/// Completion callback of a register access: called from interrupt context
/// with the terminal state and `context`
#[derive(Debug, Clone, Copy)]
pub struct I2cCallback {
    pub func: fn(I2cState, usize),
    pub context: usize,
}

impl I2cCallback {
    pub const fn new(func: fn(I2cState, usize), context: usize) -> Self {
        Self { func, context }
    }
}

/// Buffers handed back by a finished transaction
#[derive(Debug, PartialEq, Eq)]
pub enum I2cBuffers<'d> {
    Generic { out: &'d [u8], input: &'d mut [u8] },
    RegWrite(&'d [u8]),
    RegRead(&'d mut [u8]),
    Scan,
}

#[derive(Debug)]
pub(crate) enum I2cKind<'d> {
    Generic {
        out: &'d [u8],
        input: &'d mut [u8],
        bytes_out: u16,
        bytes_in: u16,
    },
    RegWrite {
        register: u8,
        data: &'d [u8],
        position: u16,
    },
    RegRead {
        register: u8,
        data: &'d mut [u8],
        position: u16,
    },
    Scan {
        /// Bit n set when address n acknowledged
        results: u128,
        /// Address being probed
        address: u8,
    },
}

impl Default for I2cKind<'_> {
    fn default() -> Self {
        I2cKind::Scan {
            results: 0,
            address: 0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct I2cTransaction<'d> {
    pub kind: I2cKind<'d>,
    /// 7-bit device address shifted into the address byte
    pub address: u8,
    pub dma_out: bool,
    pub dma_in: bool,
    pub state: I2cState,
    pub callback: Option<I2cCallback>,
}

impl<'d> I2cTransaction<'d> {
    pub fn new(device: u8, kind: I2cKind<'d>) -> Self {
        Self {
            kind,
            address: device << 1,
            dma_out: false,
            dma_in: false,
            state: I2cState::Pending,
            callback: None,
        }
    }

    /// Length of the in stage
    pub fn in_length(&self) -> u16 {
        match &self.kind {
            I2cKind::Generic { input, .. } => input.len() as u16,
            I2cKind::RegRead { data, .. } => data.len() as u16,
            _ => 0,
        }
    }

    /// Address of the in stage buffer, for DMA
    pub fn in_address(&mut self) -> u32 {
        match &mut self.kind {
            I2cKind::Generic { input, .. } => input.as_mut_ptr() as usize as u32,
            I2cKind::RegRead { data, .. } => data.as_mut_ptr() as usize as u32,
            _ => 0,
        }
    }

    /// Hand the buffers back, leaving empty ones behind
    pub fn take_buffers(&mut self) -> I2cBuffers<'d> {
        match &mut self.kind {
            I2cKind::Generic { out, input, .. } => I2cBuffers::Generic {
                out: mem::take(out),
                input: mem::take(input),
            },
            I2cKind::RegWrite { data, .. } => I2cBuffers::RegWrite(mem::take(data)),
            I2cKind::RegRead { data, .. } => I2cBuffers::RegRead(mem::take(data)),
            I2cKind::Scan { .. } => I2cBuffers::Scan,
        }
    }
}
