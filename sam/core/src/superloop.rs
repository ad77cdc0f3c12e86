//! Cooperative service loop
//!
//! The firmware has no threads: the main loop calls every registered
//! service routine once per pass, then sleeps until the next interrupt
//! unless some driver is holding the [`SleepGate`].

use core::cell::RefCell;
use critical_section::Mutex;
use heapless::Vec;

use crate::{PResult, PeriphError, SleepGate};

/// A foreground service routine
pub type ServiceFn = fn();

/// Main loop runner with room for `N` service routines
pub struct ServiceLoop<'a, const N: usize> {
    services: Mutex<RefCell<Vec<ServiceFn, N>>>,
    sleep: &'a SleepGate,
    passes: Mutex<RefCell<u32>>,
}

impl<'a, const N: usize> ServiceLoop<'a, N> {
    /// Create a loop that consults `sleep` before idling
    pub const fn new(sleep: &'a SleepGate) -> Self {
        Self {
            services: Mutex::new(RefCell::new(Vec::new())),
            sleep,
            passes: Mutex::new(RefCell::new(0)),
        }
    }

    /// Append a service routine; routines run in registration order
    pub fn register(&self, service: ServiceFn) -> PResult<()> {
        critical_section::with(|cs| {
            self.services
                .borrow_ref_mut(cs)
                .push(service)
                .map_err(|_| PeriphError::QueueFull)
        })
    }

    /// Run every service routine once.
    ///
    /// Returns `true` if the CPU may sleep afterwards.
    pub fn poll_once(&self) -> bool {
        let services = critical_section::with(|cs| self.services.borrow_ref(cs).clone());
        // Routines run with interrupts enabled so a completing transfer can
        // preempt them.
        for service in services.iter() {
            service();
        }
        critical_section::with(|cs| {
            let mut passes = self.passes.borrow_ref_mut(cs);
            *passes = passes.wrapping_add(1);
        });
        self.sleep.sleep_allowed()
    }

    /// Number of completed passes
    pub fn passes(&self) -> u32 {
        critical_section::with(|cs| *self.passes.borrow_ref(cs))
    }

    /// Run the main loop forever
    pub fn run(&self) -> ! {
        loop {
            if self.poll_once() {
                Self::on_idle();
            }
        }
    }

    /// Idle callback - called when no driver inhibits sleep
    fn on_idle() {
        #[cfg(target_arch = "arm")]
        {
            cortex_m::asm::wfi();
        }
    }
}
