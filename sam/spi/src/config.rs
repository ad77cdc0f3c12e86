//! SPI driver configuration

use sam_dma::DmaChannelConfig;
use sam_sercom::{SercomInstance, SERCOM_DMA_RX_PRIORITY, SERCOM_DMA_TX_PRIORITY};

/// Baud rate used when a transaction asks for more than the clock allows
pub const SPI_BAUD_FALLBACK: u32 = 1_000_000;

/// Default SERCOM core clock
pub const SPI_DEFAULT_CORE_FREQUENCY: u32 = 48_000_000;

/// Runtime configuration of a [`SercomSpi`](crate::SercomSpi)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    /// Frequency of the SERCOM core clock in Hz
    pub core_frequency: u32,
    /// DMA channel used to transmit, interrupt driven when `None`
    pub tx_dma: Option<DmaChannelConfig>,
    /// DMA channel used to receive, interrupt driven when `None`
    pub rx_dma: Option<DmaChannelConfig>,
    pub fallback_baud: u32,
}

impl SpiConfig {
    pub const fn new() -> Self {
        Self {
            core_frequency: SPI_DEFAULT_CORE_FREQUENCY,
            tx_dma: None,
            rx_dma: None,
            fallback_baud: SPI_BAUD_FALLBACK,
        }
    }

    pub const fn with_core_frequency(mut self, frequency: u32) -> Self {
        self.core_frequency = frequency;
        self
    }

    pub const fn with_tx_dma(mut self, dma: DmaChannelConfig) -> Self {
        self.tx_dma = Some(dma);
        self
    }

    pub const fn with_rx_dma(mut self, dma: DmaChannelConfig) -> Self {
        self.rx_dma = Some(dma);
        self
    }

    pub const fn with_fallback_baud(mut self, baud: u32) -> Self {
        self.fallback_baud = baud;
        self
    }

    /// Use DMA in both directions with the triggers of `instance` and the
    /// default SERCOM priorities
    pub const fn with_dma(self, instance: SercomInstance, tx_channel: u8, rx_channel: u8) -> Self {
        self.with_tx_dma(DmaChannelConfig::new(
            tx_channel,
            instance.dma_tx_trigger(),
            SERCOM_DMA_TX_PRIORITY,
        ))
        .with_rx_dma(DmaChannelConfig::new(
            rx_channel,
            instance.dma_rx_trigger(),
            SERCOM_DMA_RX_PRIORITY,
        ))
    }
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self::new()
    }
}
