//! Volatile accessors relative to a register block base address

use core::ptr;

/// Base address of a register block
///
/// Only built from the fixed peripheral addresses of this crate, which are
/// valid and suitably aligned on every SAMD21.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mmio(usize);

impl Mmio {
    pub const fn new(base: usize) -> Self {
        Self(base)
    }

    pub const fn address(self, offset: usize) -> usize {
        self.0 + offset
    }

    pub fn read8(self, offset: usize) -> u8 {
        // SAFETY: `self` points at a peripheral register block
        unsafe { ptr::read_volatile(self.address(offset) as *const u8) }
    }

    pub fn write8(self, offset: usize, value: u8) {
        // SAFETY: `self` points at a peripheral register block
        unsafe { ptr::write_volatile(self.address(offset) as *mut u8, value) }
    }

    pub fn read16(self, offset: usize) -> u16 {
        // SAFETY: `self` points at a peripheral register block
        unsafe { ptr::read_volatile(self.address(offset) as *const u16) }
    }

    pub fn write16(self, offset: usize, value: u16) {
        // SAFETY: `self` points at a peripheral register block
        unsafe { ptr::write_volatile(self.address(offset) as *mut u16, value) }
    }

    pub fn read32(self, offset: usize) -> u32 {
        // SAFETY: `self` points at a peripheral register block
        unsafe { ptr::read_volatile(self.address(offset) as *const u32) }
    }

    pub fn write32(self, offset: usize, value: u32) {
        // SAFETY: `self` points at a peripheral register block
        unsafe { ptr::write_volatile(self.address(offset) as *mut u32, value) }
    }

    pub fn modify32(self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let value = self.read32(offset);
        self.write32(offset, f(value));
    }

    /// Spin until every bit of `mask` reads back as zero
    pub fn wait32(self, offset: usize, mask: u32) {
        while self.read32(offset) & mask != 0 {}
    }
}
