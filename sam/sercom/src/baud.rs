//! Baud register calculators

use sam_core::{PResult, PeriphError};

/// Compute the SPI (synchronous) BAUD register value.
///
/// Gives the value for `baud`, or for the next lower rate the clock can
/// produce. Fails when `baud` is more than half of `clock`.
pub fn calc_sync_baud(baud: u32, clock: u32) -> PResult<u8> {
    let baud = baud as u64;
    let clock = clock as u64;
    if baud == 0 || baud * 2 > clock {
        return Err(PeriphError::BaudUnachievable);
    }
    let value = (clock - 1) / (2 * baud);
    Ok(value.min(u8::MAX as u64) as u8)
}

/// USART oversampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleRate {
    X16,
    X8,
    X3,
}

impl SampleRate {
    /// Samples per bit
    pub const fn samples(self) -> u64 {
        match self {
            SampleRate::X16 => 16,
            SampleRate::X8 => 8,
            SampleRate::X3 => 3,
        }
    }

    /// CTRLA.SAMPR field value for arithmetic baud generation
    pub const fn sampr(self) -> u8 {
        match self {
            SampleRate::X16 => 0x0,
            SampleRate::X8 => 0x2,
            SampleRate::X3 => 0x4,
        }
    }
}

/// Compute the USART (asynchronous, arithmetic) BAUD register value at the
/// highest sample rate `clock` allows.
///
/// `BAUD = 65536 * (1 - S * baud / clock)`, evaluated in 32.32 fixed point.
/// A zero `baud` or `clock` is unachievable.
pub fn calc_async_baud(baud: u32, clock: u32) -> PResult<(u16, SampleRate)> {
    if baud == 0 || clock == 0 {
        return Err(PeriphError::BaudUnachievable);
    }
    let rate = baud as u64;
    let clock = clock as u64;
    let sample_rate = [SampleRate::X16, SampleRate::X8, SampleRate::X3]
        .into_iter()
        .find(|s| rate * s.samples() <= clock)
        .ok_or(PeriphError::BaudUnachievable)?;

    let ratio = ((sample_rate.samples() * rate) << 32) / clock;
    let scale = (1u64 << 32) - ratio;
    let value = (65536 * scale) >> 32;
    Ok((value.min(u16::MAX as u64) as u16, sample_rate))
}

/// I2C bus speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cMode {
    /// 100 kHz
    #[default]
    Standard,
    /// 400 kHz
    Fast,
    /// 1 MHz
    FastPlus,
    /// 3.4 MHz
    HighSpeed,
}

impl I2cMode {
    /// Target SCL frequency in Hz
    pub const fn frequency(self) -> u32 {
        match self {
            I2cMode::Standard => 100_000,
            I2cMode::Fast => 400_000,
            I2cMode::FastPlus => 1_000_000,
            I2cMode::HighSpeed => 3_400_000,
        }
    }

    /// Fraction of the SCL period spent high
    pub const fn high_ratio(self) -> f32 {
        match self {
            I2cMode::Standard => 0.5,
            _ => 0.33,
        }
    }

    /// Worst case SCL rise time in seconds
    pub const fn rise_time(self) -> f32 {
        match self {
            I2cMode::Standard | I2cMode::Fast => 0.000_000_3,
            I2cMode::FastPlus => 0.000_000_1,
            I2cMode::HighSpeed => 0.000_000_04,
        }
    }

    /// CTRLA.SPEED field value
    pub const fn speed_field(self) -> u8 {
        match self {
            I2cMode::Standard | I2cMode::Fast => 0x0,
            I2cMode::FastPlus => 0x1,
            I2cMode::HighSpeed => 0x2,
        }
    }
}

/// SCL high and low period register values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cBaud {
    pub high: u8,
    /// Zero selects `high` for both halves of the period
    pub low: u8,
}

/// Compute the I2C master baud fields for `mode` from the SERCOM core clock
pub fn calc_i2c_baud(mode: I2cMode, core_frequency: u32) -> I2cBaud {
    let f_scl = mode.frequency();
    let total = match mode {
        I2cMode::HighSpeed => ((core_frequency / f_scl) as f32 - 2.0) as u8,
        _ => {
            let overhead = 10.0 + core_frequency as f32 * mode.rise_time();
            ((core_frequency / f_scl) as f32 - overhead) as u8
        }
    };
    let high = total as f32 * mode.high_ratio();
    match mode {
        I2cMode::Standard => I2cBaud {
            high: high as u8,
            low: 0,
        },
        _ => I2cBaud {
            high: high as u8,
            low: (total as f32 - high) as u8,
        },
    }
}
