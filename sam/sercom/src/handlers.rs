//! Per-instance SERCOM interrupt routing
//!
//! A SAMD21 SERCOM has one interrupt vector; the handler reads the raised and
//! enabled flags and hands them to [`SercomHandlers::dispatch`], which calls
//! the function the owning driver registered for each flag.

use core::cell::RefCell;
use critical_section::Mutex;

use sam_core::{PResult, PeriphError};

use crate::regs::SercomInterrupts;

/// Interrupt entry point, called with the registered context
pub type SercomIsr = fn(usize);

/// Handlers for one instance
#[derive(Debug, Clone, Copy)]
pub struct SercomHandler {
    /// DRE in SPI, MB in I2C master mode
    pub flag0: Option<SercomIsr>,
    /// TXC in SPI, SB in I2C master mode
    pub flag1: Option<SercomIsr>,
    /// RXC
    pub flag2: Option<SercomIsr>,
    /// ERROR and the remaining flags
    pub misc: Option<SercomIsr>,
    pub context: usize,
}

impl SercomHandler {
    pub const fn spi(dre: SercomIsr, txc: SercomIsr, rxc: SercomIsr, context: usize) -> Self {
        Self {
            flag0: Some(dre),
            flag1: Some(txc),
            flag2: Some(rxc),
            misc: None,
            context,
        }
    }

    pub const fn i2c(mb: SercomIsr, sb: SercomIsr, error: SercomIsr, context: usize) -> Self {
        Self {
            flag0: Some(mb),
            flag1: Some(sb),
            flag2: None,
            misc: Some(error),
            context,
        }
    }
}

/// Registry of SERCOM handlers indexed by instance number
pub struct SercomHandlers<const N: usize = 6> {
    handlers: Mutex<RefCell<[Option<SercomHandler>; N]>>,
}

impl<const N: usize> SercomHandlers<N> {
    pub const fn new() -> Self {
        Self {
            handlers: Mutex::new(RefCell::new([None; N])),
        }
    }

    /// Install the handlers of `instance`, replacing any earlier ones
    pub fn register(&self, instance: u8, handler: SercomHandler) -> PResult<()> {
        critical_section::with(|cs| {
            let mut handlers = self.handlers.borrow_ref_mut(cs);
            let slot = handlers
                .get_mut(instance as usize)
                .ok_or(PeriphError::InvalidChannel)?;
            *slot = Some(handler);
            Ok(())
        })
    }

    pub fn clear(&self, instance: u8) {
        critical_section::with(|cs| {
            if let Some(slot) = self.handlers.borrow_ref_mut(cs).get_mut(instance as usize) {
                *slot = None;
            }
        });
    }

    /// Call the handlers of `instance` for each flag in `pending`, in flag
    /// order. Flags without a handler are ignored.
    pub fn dispatch(&self, instance: u8, pending: SercomInterrupts) {
        let handler = critical_section::with(|cs| {
            self.handlers
                .borrow_ref(cs)
                .get(instance as usize)
                .copied()
                .flatten()
        });
        let Some(handler) = handler else {
            trace!("no handler for SERCOM{}", instance);
            return;
        };

        let misc_flags = SercomInterrupts::from_bits(0b1111_1000);
        let routes = [
            (SercomInterrupts::from_bits(1 << 0), handler.flag0),
            (SercomInterrupts::from_bits(1 << 1), handler.flag1),
            (SercomInterrupts::from_bits(1 << 2), handler.flag2),
            (misc_flags, handler.misc),
        ];
        for (flags, isr) in routes {
            if pending.intersects(flags) {
                if let Some(isr) = isr {
                    isr(handler.context);
                }
            }
        }
    }
}

impl<const N: usize> Default for SercomHandlers<N> {
    fn default() -> Self {
        Self::new()
    }
}
