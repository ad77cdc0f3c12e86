//! Non-blocking re-entrancy lock for driver service routines

use core::sync::atomic::{AtomicBool, Ordering};

/// Try-lock guarding a driver's service routine.
///
/// Acquiring never spins: a caller that finds the lock held simply returns,
/// relying on the holder to finish the state transition it was running.
/// Only plain loads and stores are used so the lock also works on cores
/// without compare-and-swap (Cortex-M0+). An interrupt landing between the
/// check and the store runs its own service pass to completion before the
/// foreground resumes, so the gap is harmless.
#[derive(Debug)]
pub struct ServiceLock {
    held: AtomicBool,
}

impl ServiceLock {
    /// Create a new, released lock
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Try to take the lock, returns `false` if it is already held
    pub fn try_acquire(&self) -> bool {
        if self.held.load(Ordering::Acquire) {
            return false;
        }
        self.held.store(true, Ordering::Release);
        true
    }

    /// Release the lock
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    /// Check if the lock is currently held
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Default for ServiceLock {
    fn default() -> Self {
        Self::new()
    }
}
