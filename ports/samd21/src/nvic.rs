//! NVIC lines and priorities

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;
use sam_sercom::SercomInstance;

/// External interrupt line number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Irq(pub u16);

// SAFETY: every `Irq` this crate builds is an interrupt line of the SAMD21
unsafe impl InterruptNumber for Irq {
    fn number(self) -> u16 {
        self.0
    }
}

pub const DMAC_IRQ: Irq = Irq(6);

const SERCOM0_IRQ: u16 = 9;

/// Priority bits implemented by the Cortex-M0+
pub const NVIC_PRIO_BITS: u8 = 2;

pub const fn sercom_irq(instance: SercomInstance) -> Irq {
    Irq(SERCOM0_IRQ + instance.number() as u16)
}

/// Shift a logical priority into the implemented top bits
pub const fn hw_priority(priority: u8) -> u8 {
    (priority & ((1 << NVIC_PRIO_BITS) - 1)) << (8 - NVIC_PRIO_BITS)
}

/// Set the priority of `irq` and unmask it
pub fn unmask(irq: Irq, priority: u8) {
    // SAFETY: only the priority and enable bit of `irq` change; its handler
    // is registered before the driver that calls this starts a transfer
    unsafe {
        let mut peripherals = cortex_m::Peripherals::steal();
        peripherals.NVIC.set_priority(irq, hw_priority(priority));
        NVIC::unmask(irq);
    }
}
