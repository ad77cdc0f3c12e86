//! Register-level seams for SERCOM instances and the PORT controller
//!
//! The drivers only touch hardware through these traits. Every method takes
//! `&self` since a driver is shared between the main loop and interrupt
//! handlers; implementations are expected to be thin volatile accessors.

use crate::baud::{I2cBaud, I2cMode};

/// SERCOM interrupt flag / enable bits
///
/// Bit positions are shared between modes: bit 0 is DRE in SPI and MB in
/// I2C master mode, bit 1 is TXC or SB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SercomInterrupts(u8);

impl SercomInterrupts {
    pub const DRE: Self = Self(1 << 0);
    pub const TXC: Self = Self(1 << 1);
    pub const RXC: Self = Self(1 << 2);
    pub const MB: Self = Self(1 << 0);
    pub const SB: Self = Self(1 << 1);
    pub const ERROR: Self = Self(1 << 7);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl core::ops::BitOr for SercomInterrupts {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// I2C bus state as tracked by the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    Unknown,
    Idle,
    Owner,
    Busy,
}

impl BusState {
    pub const fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => BusState::Unknown,
            1 => BusState::Idle,
            2 => BusState::Owner,
            _ => BusState::Busy,
        }
    }

    pub const fn bits(self) -> u16 {
        match self {
            BusState::Unknown => 0,
            BusState::Idle => 1,
            BusState::Owner => 2,
            BusState::Busy => 3,
        }
    }
}

/// I2C master STATUS register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cStatus(u16);

impl I2cStatus {
    pub const BUSERR: u16 = 1 << 0;
    pub const ARBLOST: u16 = 1 << 1;
    pub const RXNACK: u16 = 1 << 2;
    pub const BUSSTATE_SHIFT: u16 = 4;
    pub const LENERR: u16 = 1 << 10;

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn bus_error(self) -> bool {
        self.0 & Self::BUSERR != 0
    }

    pub const fn arbitration_lost(self) -> bool {
        self.0 & Self::ARBLOST != 0
    }

    /// The slave did not acknowledge the last address or data byte
    pub const fn rx_nack(self) -> bool {
        self.0 & Self::RXNACK != 0
    }

    /// The transfer ended before ADDR.LEN bytes were moved
    pub const fn length_error(self) -> bool {
        self.0 & Self::LENERR != 0
    }

    pub const fn bus_state(self) -> BusState {
        BusState::from_bits(self.0 >> Self::BUSSTATE_SHIFT)
    }
}

/// I2C master command written to CTRLB.CMD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum I2cCommand {
    RepeatedStart = 0x1,
    ReadByte = 0x2,
    Stop = 0x3,
}

/// SERCOM instance in SPI master mode
pub trait SpiRegisters {
    /// Software-reset the instance and wait for the reset to finish
    fn reset(&self);

    /// MISO on pad 2, MOSI on pad 0, SCK on pad 1, 8-bit characters, run in
    /// standby, master mode
    fn configure_master(&self);

    fn set_baud(&self, baud: u8);

    /// Enable the instance and wait for synchronization
    fn enable(&self);

    fn disable(&self);

    /// Turn the receiver on or off
    fn set_receiver(&self, enabled: bool);

    fn write_data(&self, byte: u8);

    fn read_data(&self) -> u8;

    /// Address of the DATA register, used as a DMA endpoint
    fn data_address(&self) -> u32;

    fn enable_interrupts(&self, mask: SercomInterrupts);

    fn disable_interrupts(&self, mask: SercomInterrupts);

    /// Flags that are both raised and enabled
    fn pending_interrupts(&self) -> SercomInterrupts;

    /// Set the NVIC priority of the instance interrupt and unmask it
    fn unmask_interrupt(&self, priority: u8);
}

/// SERCOM instance in I2C master mode
pub trait I2cRegisters {
    /// Software-reset the instance and wait for the reset to finish
    fn reset(&self);

    /// Master mode at `mode`'s speed with smart mode enabled
    fn configure_master(&self, mode: I2cMode);

    fn set_baud(&self, baud: I2cBaud);

    /// Enable the instance and wait for synchronization
    fn enable(&self);

    /// Force the bus state to idle. Without this the master waits for a stop
    /// condition that never comes when it is the only master on the bus.
    fn force_idle(&self);

    fn status(&self) -> I2cStatus;

    /// Write ADDR to issue a (repeated) start. `length` enables automatic
    /// length counting for DMA driven transfers.
    fn write_addr(&self, address: u8, length: Option<u8>);

    fn write_data(&self, byte: u8);

    fn read_data(&self) -> u8;

    /// Address of the DATA register, used as a DMA endpoint
    fn data_address(&self) -> u32;

    /// Answer the next received byte with a NACK instead of an ACK
    fn set_ack_action(&self, nack: bool);

    /// Issue `command` and wait for synchronization
    fn command(&self, command: I2cCommand);

    fn enable_interrupts(&self, mask: SercomInterrupts);

    fn disable_interrupts(&self, mask: SercomInterrupts);

    /// Clear raised interrupt flags
    fn clear_interrupts(&self, mask: SercomInterrupts);

    /// Flags that are both raised and enabled
    fn pending_interrupts(&self) -> SercomInterrupts;

    /// Set the NVIC priority of the instance interrupt and unmask it
    fn unmask_interrupt(&self, priority: u8);
}

/// Output side of the PORT controller
pub trait PortRegisters {
    /// Drive the pins in `mask` of `group` high
    fn set_pins(&self, group: u8, mask: u32);

    /// Drive the pins in `mask` of `group` low
    fn clear_pins(&self, group: u8, mask: u32);
}

impl<T: SpiRegisters + ?Sized> SpiRegisters for &T {
    fn reset(&self) {
        (**self).reset()
    }

    fn configure_master(&self) {
        (**self).configure_master()
    }

    fn set_baud(&self, baud: u8) {
        (**self).set_baud(baud)
    }

    fn enable(&self) {
        (**self).enable()
    }

    fn disable(&self) {
        (**self).disable()
    }

    fn set_receiver(&self, enabled: bool) {
        (**self).set_receiver(enabled)
    }

    fn write_data(&self, byte: u8) {
        (**self).write_data(byte)
    }

    fn read_data(&self) -> u8 {
        (**self).read_data()
    }

    fn data_address(&self) -> u32 {
        (**self).data_address()
    }

    fn enable_interrupts(&self, mask: SercomInterrupts) {
        (**self).enable_interrupts(mask)
    }

    fn disable_interrupts(&self, mask: SercomInterrupts) {
        (**self).disable_interrupts(mask)
    }

    fn pending_interrupts(&self) -> SercomInterrupts {
        (**self).pending_interrupts()
    }

    fn unmask_interrupt(&self, priority: u8) {
        (**self).unmask_interrupt(priority)
    }
}

impl<T: I2cRegisters + ?Sized> I2cRegisters for &T {
    fn reset(&self) {
        (**self).reset()
    }

    fn configure_master(&self, mode: I2cMode) {
        (**self).configure_master(mode)
    }

    fn set_baud(&self, baud: I2cBaud) {
        (**self).set_baud(baud)
    }

    fn enable(&self) {
        (**self).enable()
    }

    fn force_idle(&self) {
        (**self).force_idle()
    }

    fn status(&self) -> I2cStatus {
        (**self).status()
    }

    fn write_addr(&self, address: u8, length: Option<u8>) {
        (**self).write_addr(address, length)
    }

    fn write_data(&self, byte: u8) {
        (**self).write_data(byte)
    }

    fn read_data(&self) -> u8 {
        (**self).read_data()
    }

    fn data_address(&self) -> u32 {
        (**self).data_address()
    }

    fn set_ack_action(&self, nack: bool) {
        (**self).set_ack_action(nack)
    }

    fn command(&self, command: I2cCommand) {
        (**self).command(command)
    }

    fn enable_interrupts(&self, mask: SercomInterrupts) {
        (**self).enable_interrupts(mask)
    }

    fn disable_interrupts(&self, mask: SercomInterrupts) {
        (**self).disable_interrupts(mask)
    }

    fn clear_interrupts(&self, mask: SercomInterrupts) {
        (**self).clear_interrupts(mask)
    }

    fn pending_interrupts(&self) -> SercomInterrupts {
        (**self).pending_interrupts()
    }

    fn unmask_interrupt(&self, priority: u8) {
        (**self).unmask_interrupt(priority)
    }
}

impl<T: PortRegisters + ?Sized> PortRegisters for &T {
    fn set_pins(&self, group: u8, mask: u32) {
        (**self).set_pins(group, mask)
    }

    fn clear_pins(&self, group: u8, mask: u32) {
        (**self).clear_pins(group, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_fields() {
        let status = I2cStatus::from_bits(I2cStatus::RXNACK | (1 << I2cStatus::BUSSTATE_SHIFT));
        assert!(status.rx_nack());
        assert!(!status.bus_error());
        assert_eq!(status.bus_state(), BusState::Idle);
        assert_eq!(
            I2cStatus::from_bits(3 << I2cStatus::BUSSTATE_SHIFT).bus_state(),
            BusState::Busy
        );
    }

    #[test]
    fn test_interrupt_masks() {
        let mask = SercomInterrupts::DRE | SercomInterrupts::RXC;
        assert!(mask.contains(SercomInterrupts::DRE));
        assert!(!mask.contains(SercomInterrupts::TXC));
        assert_eq!(mask.difference(SercomInterrupts::DRE), SercomInterrupts::RXC);
        assert_eq!(SercomInterrupts::MB, SercomInterrupts::DRE);
    }
}
