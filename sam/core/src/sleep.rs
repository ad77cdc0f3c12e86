//! Sleep inhibit counter consulted by the main loop

use core::cell::Cell;
use critical_section::Mutex;

/// Counts outstanding requests to keep the CPU awake.
///
/// Drivers that need prompt foreground polling (the I2C bus-idle wait)
/// call [`inhibit`](Self::inhibit) and pair it with [`allow`](Self::allow)
/// once the condition they poll for has been observed.
pub struct SleepGate {
    inhibits: Mutex<Cell<u8>>,
}

impl SleepGate {
    pub const fn new() -> Self {
        Self {
            inhibits: Mutex::new(Cell::new(0)),
        }
    }

    /// Prevent the main loop from sleeping
    pub fn inhibit(&self) {
        critical_section::with(|cs| {
            let count = self.inhibits.borrow(cs);
            count.set(count.get().saturating_add(1));
        });
    }

    /// Drop one sleep inhibit
    pub fn allow(&self) {
        critical_section::with(|cs| {
            let count = self.inhibits.borrow(cs);
            count.set(count.get().saturating_sub(1));
        });
    }

    /// Number of outstanding inhibits
    pub fn inhibit_count(&self) -> u8 {
        critical_section::with(|cs| self.inhibits.borrow(cs).get())
    }

    /// True when nothing is holding the CPU awake
    pub fn sleep_allowed(&self) -> bool {
        self.inhibit_count() == 0
    }
}

impl Default for SleepGate {
    fn default() -> Self {
        Self::new()
    }
}
