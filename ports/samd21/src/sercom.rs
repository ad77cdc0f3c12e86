//! SERCOM register blocks in SPI and I2C master mode

use sam_sercom::{
    I2cBaud, I2cCommand, I2cMode, I2cRegisters, I2cStatus, SercomInstance, SercomInterrupts,
    SpiRegisters,
};

use crate::mmio::Mmio;
use crate::nvic::{self, sercom_irq};

const SERCOM0_BASE: usize = 0x4200_0800;
const SERCOM_STRIDE: usize = 0x400;

const CTRLA: usize = 0x00;
const CTRLB: usize = 0x04;
const BAUD: usize = 0x0C;
const INTENCLR: usize = 0x14;
const INTENSET: usize = 0x16;
const INTFLAG: usize = 0x18;
const STATUS: usize = 0x1A;
const SYNCBUSY: usize = 0x1C;
const ADDR: usize = 0x24;
const DATA: usize = 0x28;

const CTRLA_SWRST: u32 = 1 << 0;
const CTRLA_ENABLE: u32 = 1 << 1;
const CTRLA_MODE_SHIFT: u32 = 2;
const CTRLA_RUNSTDBY: u32 = 1 << 7;

const SYNCBUSY_SWRST: u32 = 1 << 0;
const SYNCBUSY_ENABLE: u32 = 1 << 1;
/// CTRLB in SPI mode, SYSOP in I2C mode
const SYNCBUSY_CTRLB_SYSOP: u32 = 1 << 2;

const MODE_SPI_MASTER: u32 = 0x3;
const MODE_I2C_MASTER: u32 = 0x5;

const SPI_DOPO_SHIFT: u32 = 16;
const SPI_DIPO_SHIFT: u32 = 20;
const SPI_CTRLB_RXEN: u32 = 1 << 17;

const I2C_SDAHOLD_SHIFT: u32 = 20;
const I2C_SPEED_SHIFT: u32 = 24;
const I2C_SPEED_MASK: u32 = 0x3 << I2C_SPEED_SHIFT;
const I2C_INACTOUT_SHIFT: u32 = 28;
const I2C_CTRLB_SMEN: u32 = 1 << 8;
const I2C_CTRLB_CMD_SHIFT: u32 = 16;
const I2C_CTRLB_CMD_MASK: u32 = 0x3 << I2C_CTRLB_CMD_SHIFT;
const I2C_CTRLB_ACKACT: u32 = 1 << 18;
const I2C_ADDR_LENEN: u32 = 1 << 13;
const I2C_ADDR_LEN_SHIFT: u32 = 16;
const I2C_HSBAUD_SHIFT: u32 = 16;

/// Base address of SERCOM `instance`
pub const fn sercom_base(instance: SercomInstance) -> usize {
    SERCOM0_BASE + instance.number() as usize * SERCOM_STRIDE
}

/// SPI master CTRLA: data out on pad 0 with SCK on pad 1, data in on pad 2
pub const fn spi_ctrla() -> u32 {
    (0x2 << SPI_DIPO_SHIFT)
        | (0x0 << SPI_DOPO_SHIFT)
        | CTRLA_RUNSTDBY
        | (MODE_SPI_MASTER << CTRLA_MODE_SHIFT)
}

/// I2C master CTRLA: 300-600 ns SDA hold, 205 us inactive timeout
pub const fn i2c_ctrla(mode: I2cMode) -> u32 {
    (0x3 << I2C_INACTOUT_SHIFT)
        | (0x2 << I2C_SDAHOLD_SHIFT)
        | ((mode.speed_field() as u32) << I2C_SPEED_SHIFT)
        | (MODE_I2C_MASTER << CTRLA_MODE_SHIFT)
}

/// ADDR value for `address`, with automatic length counting when
/// `length` is given
pub const fn i2c_addr(address: u8, length: Option<u8>) -> u32 {
    match length {
        Some(len) => address as u32 | I2C_ADDR_LENEN | ((len as u32) << I2C_ADDR_LEN_SHIFT),
        None => address as u32,
    }
}

/// BAUD value for `baud`; high-speed mode uses the HSBAUD halves
pub const fn i2c_baud(baud: I2cBaud, high_speed: bool) -> u32 {
    let value = baud.high as u32 | ((baud.low as u32) << 8);
    if high_speed {
        value << I2C_HSBAUD_SHIFT
    } else {
        value
    }
}

/// Reset, enable and interrupt plumbing shared by both modes
#[derive(Debug)]
struct Sercom {
    instance: SercomInstance,
    regs: Mmio,
}

impl Sercom {
    const fn new(instance: SercomInstance) -> Self {
        Self {
            instance,
            regs: Mmio::new(sercom_base(instance)),
        }
    }

    fn reset(&self) {
        self.regs.write32(CTRLA, CTRLA_SWRST);
        self.regs.wait32(SYNCBUSY, SYNCBUSY_SWRST);
    }

    fn set_enabled(&self, enabled: bool) {
        self.regs.modify32(CTRLA, |ctrla| {
            if enabled {
                ctrla | CTRLA_ENABLE
            } else {
                ctrla & !CTRLA_ENABLE
            }
        });
        self.regs.wait32(SYNCBUSY, SYNCBUSY_ENABLE);
    }

    fn enable_interrupts(&self, mask: SercomInterrupts) {
        self.regs.write8(INTENSET, mask.bits());
    }

    fn disable_interrupts(&self, mask: SercomInterrupts) {
        self.regs.write8(INTENCLR, mask.bits());
    }

    fn pending_interrupts(&self) -> SercomInterrupts {
        SercomInterrupts::from_bits(self.regs.read8(INTFLAG) & self.regs.read8(INTENSET))
    }

    fn unmask_interrupt(&self, priority: u8) {
        nvic::unmask(sercom_irq(self.instance), priority);
    }

    fn data_address(&self) -> u32 {
        self.regs.address(DATA) as u32
    }
}

/// SERCOM instance driven as an SPI master
#[derive(Debug)]
pub struct Samd21Spi(Sercom);

impl Samd21Spi {
    pub const fn new(instance: SercomInstance) -> Self {
        Self(Sercom::new(instance))
    }

    pub const fn instance(&self) -> SercomInstance {
        self.0.instance
    }
}

impl SpiRegisters for Samd21Spi {
    fn reset(&self) {
        self.0.reset();
    }

    fn configure_master(&self) {
        self.0.regs.write32(CTRLA, spi_ctrla());
        // 8-bit characters
        self.0.regs.write32(CTRLB, 0);
        self.0.regs.wait32(SYNCBUSY, SYNCBUSY_CTRLB_SYSOP);
    }

    fn set_baud(&self, baud: u8) {
        self.0.regs.write8(BAUD, baud);
    }

    fn enable(&self) {
        self.0.set_enabled(true);
    }

    fn disable(&self) {
        self.0.set_enabled(false);
    }

    fn set_receiver(&self, enabled: bool) {
        self.0.regs.modify32(CTRLB, |ctrlb| {
            if enabled {
                ctrlb | SPI_CTRLB_RXEN
            } else {
                ctrlb & !SPI_CTRLB_RXEN
            }
        });
        self.0.regs.wait32(SYNCBUSY, SYNCBUSY_CTRLB_SYSOP);
    }

    fn write_data(&self, byte: u8) {
        self.0.regs.write32(DATA, byte as u32);
    }

    fn read_data(&self) -> u8 {
        self.0.regs.read32(DATA) as u8
    }

    fn data_address(&self) -> u32 {
        self.0.data_address()
    }

    fn enable_interrupts(&self, mask: SercomInterrupts) {
        self.0.enable_interrupts(mask);
    }

    fn disable_interrupts(&self, mask: SercomInterrupts) {
        self.0.disable_interrupts(mask);
    }

    fn pending_interrupts(&self) -> SercomInterrupts {
        self.0.pending_interrupts()
    }

    fn unmask_interrupt(&self, priority: u8) {
        self.0.unmask_interrupt(priority);
    }
}

/// SERCOM instance driven as an I2C master
#[derive(Debug)]
pub struct Samd21I2c(Sercom);

impl Samd21I2c {
    pub const fn new(instance: SercomInstance) -> Self {
        Self(Sercom::new(instance))
    }

    pub const fn instance(&self) -> SercomInstance {
        self.0.instance
    }

    fn wait_sysop(&self) {
        self.0.regs.wait32(SYNCBUSY, SYNCBUSY_CTRLB_SYSOP);
    }
}

impl I2cRegisters for Samd21I2c {
    fn reset(&self) {
        self.0.reset();
    }

    fn configure_master(&self, mode: I2cMode) {
        self.0.regs.write32(CTRLA, i2c_ctrla(mode));
        self.0.regs.write32(CTRLB, I2C_CTRLB_SMEN);
        self.wait_sysop();
    }

    fn set_baud(&self, baud: I2cBaud) {
        let speed = (self.0.regs.read32(CTRLA) & I2C_SPEED_MASK) >> I2C_SPEED_SHIFT;
        let high_speed = speed == I2cMode::HighSpeed.speed_field() as u32;
        self.0.regs.write32(BAUD, i2c_baud(baud, high_speed));
    }

    fn enable(&self) {
        self.0.set_enabled(true);
    }

    fn force_idle(&self) {
        self.0.regs.write16(STATUS, 1 << I2cStatus::BUSSTATE_SHIFT);
        self.wait_sysop();
    }

    fn status(&self) -> I2cStatus {
        I2cStatus::from_bits(self.0.regs.read16(STATUS))
    }

    fn write_addr(&self, address: u8, length: Option<u8>) {
        self.0.regs.write32(ADDR, i2c_addr(address, length));
        self.wait_sysop();
    }

    fn write_data(&self, byte: u8) {
        self.0.regs.write8(DATA, byte);
        self.wait_sysop();
    }

    fn read_data(&self) -> u8 {
        let byte = self.0.regs.read8(DATA);
        self.wait_sysop();
        byte
    }

    fn data_address(&self) -> u32 {
        self.0.data_address()
    }

    fn set_ack_action(&self, nack: bool) {
        self.0.regs.modify32(CTRLB, |ctrlb| {
            if nack {
                ctrlb | I2C_CTRLB_ACKACT
            } else {
                ctrlb & !I2C_CTRLB_ACKACT
            }
        });
    }

    fn command(&self, command: I2cCommand) {
        self.0.regs.modify32(CTRLB, |ctrlb| {
            (ctrlb & !I2C_CTRLB_CMD_MASK) | ((command as u32) << I2C_CTRLB_CMD_SHIFT)
        });
        self.wait_sysop();
    }

    fn enable_interrupts(&self, mask: SercomInterrupts) {
        self.0.enable_interrupts(mask);
    }

    fn disable_interrupts(&self, mask: SercomInterrupts) {
        self.0.disable_interrupts(mask);
    }

    fn clear_interrupts(&self, mask: SercomInterrupts) {
        self.0.regs.write8(INTFLAG, mask.bits());
    }

    fn pending_interrupts(&self) -> SercomInterrupts {
        self.0.pending_interrupts()
    }

    fn unmask_interrupt(&self, priority: u8) {
        self.0.unmask_interrupt(priority);
    }
}
