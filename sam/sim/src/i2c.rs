//! Fake SERCOM in I2C master mode

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use sam_sercom::{
    BusState, I2cBaud, I2cCommand, I2cMode, I2cRegisters, I2cStatus, SercomInterrupts,
};

use crate::FAKE_DATA_REGISTER;

/// I2C SERCOM fake
///
/// Devices are modelled as a set of 7-bit addresses that acknowledge.
/// Writing ADDR raises MB for a write (or a NACKed read) and SB for an
/// acknowledged read, as the smart-mode master does. The bus stays owned
/// until a stop command; tests can hold it busy with [`Self::set_bus_state`].
#[derive(Debug)]
pub struct FakeI2cSercom {
    acks: Cell<u128>,
    bus: Cell<BusState>,
    errors: Cell<u16>,
    rx_nack: Cell<bool>,
    raised: Cell<u8>,
    inten: Cell<u8>,
    nack_next: Cell<bool>,
    mode: Cell<Option<I2cMode>>,
    baud: Cell<Option<I2cBaud>>,
    enabled: Cell<bool>,
    irq_priority: Cell<Option<u8>>,
    addresses: RefCell<Vec<(u8, Option<u8>)>>,
    written: RefCell<Vec<u8>>,
    commands: RefCell<Vec<I2cCommand>>,
    incoming: RefCell<VecDeque<u8>>,
}

impl Default for FakeI2cSercom {
    fn default() -> Self {
        Self {
            acks: Cell::new(0),
            bus: Cell::new(BusState::Unknown),
            errors: Cell::new(0),
            rx_nack: Cell::new(false),
            raised: Cell::new(0),
            inten: Cell::new(0),
            nack_next: Cell::new(false),
            mode: Cell::new(None),
            baud: Cell::new(None),
            enabled: Cell::new(false),
            irq_priority: Cell::new(None),
            addresses: RefCell::new(Vec::new()),
            written: RefCell::new(Vec::new()),
            commands: RefCell::new(Vec::new()),
            incoming: RefCell::new(VecDeque::new()),
        }
    }
}

impl FakeI2cSercom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a device at 7-bit `address` acknowledge
    pub fn add_device(&self, address: u8) {
        if address < 128 {
            self.acks.set(self.acks.get() | 1u128 << address);
        }
    }

    pub fn remove_device(&self, address: u8) {
        if address < 128 {
            self.acks.set(self.acks.get() & !(1u128 << address));
        }
    }

    /// Queue bytes the addressed device will return
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.incoming.borrow_mut().extend(bytes.iter().copied());
    }

    pub fn set_bus_state(&self, state: BusState) {
        self.bus.set(state);
    }

    pub fn bus_state(&self) -> BusState {
        self.bus.get()
    }

    /// Set error bits of STATUS and raise the ERROR flag
    pub fn raise_error(&self, status_bits: u16) {
        self.errors.set(self.errors.get() | status_bits);
        self.raise(SercomInterrupts::ERROR);
    }

    /// Raise interrupt flags as the hardware would
    pub fn raise(&self, flags: SercomInterrupts) {
        self.raised.set(self.raised.get() | flags.bits());
    }

    /// Every ADDR write as (address byte, automatic length)
    pub fn addresses(&self) -> Vec<(u8, Option<u8>)> {
        self.addresses.borrow().clone()
    }

    /// Bytes written to DATA
    pub fn written(&self) -> Vec<u8> {
        self.written.borrow().clone()
    }

    pub fn commands(&self) -> Vec<I2cCommand> {
        self.commands.borrow().clone()
    }

    pub fn mode(&self) -> Option<I2cMode> {
        self.mode.get()
    }

    pub fn baud(&self) -> Option<I2cBaud> {
        self.baud.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn irq_priority(&self) -> Option<u8> {
        self.irq_priority.get()
    }

    pub fn enabled_interrupts(&self) -> SercomInterrupts {
        SercomInterrupts::from_bits(self.inten.get())
    }

    /// Whether the next byte read will be answered with a NACK
    pub fn nack_armed(&self) -> bool {
        self.nack_next.get()
    }
}

impl I2cRegisters for FakeI2cSercom {
    fn reset(&self) {
        self.enabled.set(false);
        self.inten.set(0);
        self.raised.set(0);
        self.errors.set(0);
        self.bus.set(BusState::Unknown);
    }

    fn configure_master(&self, mode: I2cMode) {
        self.mode.set(Some(mode));
    }

    fn set_baud(&self, baud: I2cBaud) {
        self.baud.set(Some(baud));
    }

    fn enable(&self) {
        self.enabled.set(true);
    }

    fn force_idle(&self) {
        self.bus.set(BusState::Idle);
    }

    fn status(&self) -> I2cStatus {
        let mut bits = self.errors.get() | (self.bus.get().bits() << I2cStatus::BUSSTATE_SHIFT);
        if self.rx_nack.get() {
            bits |= I2cStatus::RXNACK;
        }
        I2cStatus::from_bits(bits)
    }

    fn write_addr(&self, address: u8, length: Option<u8>) {
        self.addresses.borrow_mut().push((address, length));
        let acked = self.acks.get() & (1u128 << (address >> 1)) != 0;
        self.rx_nack.set(!acked);
        self.errors.set(0);
        self.bus.set(BusState::Owner);
        let read = address & 1 != 0;
        if read && acked {
            self.raise(SercomInterrupts::SB);
        } else {
            self.raise(SercomInterrupts::MB);
        }
    }

    fn write_data(&self, byte: u8) {
        self.written.borrow_mut().push(byte);
        self.raise(SercomInterrupts::MB);
    }

    fn read_data(&self) -> u8 {
        self.incoming.borrow_mut().pop_front().unwrap_or(0xFF)
    }

    fn data_address(&self) -> u32 {
        FAKE_DATA_REGISTER
    }

    fn set_ack_action(&self, nack: bool) {
        self.nack_next.set(nack);
    }

    fn command(&self, command: I2cCommand) {
        self.commands.borrow_mut().push(command);
        match command {
            I2cCommand::ReadByte => self.raise(SercomInterrupts::SB),
            I2cCommand::Stop => self.bus.set(BusState::Idle),
            I2cCommand::RepeatedStart => {}
        }
    }

    fn enable_interrupts(&self, mask: SercomInterrupts) {
        self.inten.set(self.inten.get() | mask.bits());
    }

    fn disable_interrupts(&self, mask: SercomInterrupts) {
        self.inten.set(self.inten.get() & !mask.bits());
    }

    fn clear_interrupts(&self, mask: SercomInterrupts) {
        self.raised.set(self.raised.get() & !mask.bits());
    }

    fn pending_interrupts(&self) -> SercomInterrupts {
        SercomInterrupts::from_bits(self.raised.get() & self.inten.get())
    }

    fn unmask_interrupt(&self, priority: u8) {
        self.irq_priority.set(Some(priority));
    }
}
