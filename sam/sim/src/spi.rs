//! Fake SERCOM in SPI master mode

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use sam_sercom::{SercomInterrupts, SpiRegisters};

use crate::FAKE_DATA_REGISTER;

/// SPI SERCOM fake
///
/// DRE is always raised. Writing DATA raises TXC and, with the receiver on,
/// queues a received byte taken from the MISO script (0xFF once it runs out).
#[derive(Debug, Default)]
pub struct FakeSpiSercom {
    baud: Cell<Option<u8>>,
    enabled: Cell<bool>,
    configured: Cell<bool>,
    receiver: Cell<bool>,
    inten: Cell<u8>,
    txc: Cell<bool>,
    rx_count: Cell<usize>,
    mosi: RefCell<Vec<u8>>,
    miso: RefCell<VecDeque<u8>>,
    irq_priority: Cell<Option<u8>>,
    enables: Cell<u32>,
}

impl FakeSpiSercom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the slave will clock out
    pub fn push_miso(&self, bytes: &[u8]) {
        self.miso.borrow_mut().extend(bytes.iter().copied());
    }

    /// Bytes written to DATA so far
    pub fn mosi(&self) -> Vec<u8> {
        self.mosi.borrow().clone()
    }

    pub fn baud(&self) -> Option<u8> {
        self.baud.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Number of times the instance was enabled
    pub fn enables(&self) -> u32 {
        self.enables.get()
    }

    pub fn is_configured(&self) -> bool {
        self.configured.get()
    }

    pub fn receiver_enabled(&self) -> bool {
        self.receiver.get()
    }

    pub fn enabled_interrupts(&self) -> SercomInterrupts {
        SercomInterrupts::from_bits(self.inten.get())
    }

    pub fn irq_priority(&self) -> Option<u8> {
        self.irq_priority.get()
    }

    /// Clock `count` bytes the way a DMA-fed transfer would, without going
    /// through DATA: TXC is raised and, with the receiver on, RXC too
    pub fn clock_bytes(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.txc.set(true);
        if self.receiver.get() {
            self.rx_count.set(self.rx_count.get() + count);
        }
    }

    fn raised(&self) -> SercomInterrupts {
        let mut raised = SercomInterrupts::DRE;
        if self.txc.get() {
            raised = raised | SercomInterrupts::TXC;
        }
        if self.rx_count.get() > 0 {
            raised = raised | SercomInterrupts::RXC;
        }
        raised
    }
}

impl SpiRegisters for FakeSpiSercom {
    fn reset(&self) {
        self.enabled.set(false);
        self.configured.set(false);
        self.receiver.set(false);
        self.inten.set(0);
        self.txc.set(false);
        self.rx_count.set(0);
    }

    fn configure_master(&self) {
        self.configured.set(true);
    }

    fn set_baud(&self, baud: u8) {
        self.baud.set(Some(baud));
    }

    fn enable(&self) {
        self.enabled.set(true);
        self.enables.set(self.enables.get() + 1);
    }

    fn disable(&self) {
        self.enabled.set(false);
        self.txc.set(false);
    }

    fn set_receiver(&self, enabled: bool) {
        self.receiver.set(enabled);
        if !enabled {
            self.rx_count.set(0);
        }
    }

    fn write_data(&self, byte: u8) {
        self.mosi.borrow_mut().push(byte);
        self.txc.set(true);
        if self.receiver.get() {
            self.rx_count.set(self.rx_count.get() + 1);
        }
    }

    fn read_data(&self) -> u8 {
        self.rx_count.set(self.rx_count.get().saturating_sub(1));
        self.miso.borrow_mut().pop_front().unwrap_or(0xFF)
    }

    fn data_address(&self) -> u32 {
        FAKE_DATA_REGISTER
    }

    fn enable_interrupts(&self, mask: SercomInterrupts) {
        self.inten.set(self.inten.get() | mask.bits());
    }

    fn disable_interrupts(&self, mask: SercomInterrupts) {
        self.inten.set(self.inten.get() & !mask.bits());
    }

    fn pending_interrupts(&self) -> SercomInterrupts {
        SercomInterrupts::from_bits(self.raised().bits() & self.inten.get())
    }

    fn unmask_interrupt(&self, priority: u8) {
        self.irq_priority.set(Some(priority));
    }
}
