//! I2C driver configuration

use sam_sercom::{I2cMode, SercomInstance, SERCOM_DMA_RX_PRIORITY};

/// Default SERCOM core clock
pub const I2C_DEFAULT_CORE_FREQUENCY: u32 = 48_000_000;

/// Shortest stage moved by DMA
pub const I2C_DMA_THRESHOLD: u16 = 3;

/// Longest stage the ADDR.LEN counter can describe
pub const I2C_DMA_MAX: u16 = 255;

/// The single DMA channel of an I2C driver.
///
/// One channel serves both directions, so it carries both trigger numbers
/// and is retargeted at the start of each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cDmaConfig {
    pub channel: u8,
    pub tx_trigger: u8,
    pub rx_trigger: u8,
    pub priority: u8,
}

impl I2cDmaConfig {
    /// Channel `channel` with the triggers of `instance`
    pub const fn new(instance: SercomInstance, channel: u8) -> Self {
        Self {
            channel,
            tx_trigger: instance.dma_tx_trigger(),
            rx_trigger: instance.dma_rx_trigger(),
            priority: SERCOM_DMA_RX_PRIORITY,
        }
    }
}

/// Runtime configuration of a [`SercomI2c`](crate::SercomI2c)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cConfig {
    /// Frequency of the SERCOM core clock in Hz
    pub core_frequency: u32,
    pub mode: I2cMode,
    /// Interrupt driven only when `None`
    pub dma: Option<I2cDmaConfig>,
    /// Stages shorter than this are stepped by interrupts even with DMA
    pub dma_threshold: u16,
}

impl I2cConfig {
    pub const fn new() -> Self {
        Self {
            core_frequency: I2C_DEFAULT_CORE_FREQUENCY,
            mode: I2cMode::Standard,
            dma: None,
            dma_threshold: I2C_DMA_THRESHOLD,
        }
    }

    pub const fn with_core_frequency(mut self, frequency: u32) -> Self {
        self.core_frequency = frequency;
        self
    }

    pub const fn with_mode(mut self, mode: I2cMode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn with_dma(mut self, instance: SercomInstance, channel: u8) -> Self {
        self.dma = Some(I2cDmaConfig::new(instance, channel));
        self
    }

    pub const fn with_dma_threshold(mut self, threshold: u16) -> Self {
        self.dma_threshold = threshold;
        self
    }

    /// Whether a stage of `length` bytes is moved by DMA
    pub const fn uses_dma(&self, length: u16) -> bool {
        self.dma.is_some() && length >= self.dma_threshold && length <= I2C_DMA_MAX
    }
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::new()
    }
}
