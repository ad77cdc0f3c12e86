//! DMA controller driver

use core::cell::RefCell;
use critical_section::Mutex;

use sam_core::{DmaRing, PResult, PeriphError};

use crate::descriptor::{config_descriptor, Block, DmacDescriptor};
use crate::regs::{ChannelFlags, DmacRegisters};
use crate::ring::RingSplit;
use crate::{DmaCallback, DmaEngine, DmaEvent};

/// Default NVIC priority of the DMAC interrupt
pub const DMA_IRQ_PRIORITY: u8 = 2;

/// Controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmacConfig {
    pub irq_priority: u8,
}

impl DmacConfig {
    pub const fn new() -> Self {
        Self {
            irq_priority: DMA_IRQ_PRIORITY,
        }
    }

    pub const fn with_irq_priority(mut self, priority: u8) -> Self {
        self.irq_priority = priority;
        self
    }
}

impl Default for DmacConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor table the DMAC fetches from, one entry per channel
#[repr(C, align(16))]
struct DescriptorTable<const CH: usize>([DmacDescriptor; CH]);

/// Ring drain in progress on a channel
#[derive(Clone, Copy)]
struct RingTransfer<'r> {
    ring: &'r (dyn DmaRing + Sync),
    length: u16,
    valid: bool,
}

struct DmacState<'r, const CH: usize> {
    descriptors: DescriptorTable<CH>,
    writeback: DescriptorTable<CH>,
    /// Second descriptor of a two-block chain, owned per channel
    links: DescriptorTable<CH>,
    rings: [Option<RingTransfer<'r>>; CH],
    callbacks: [Option<DmaCallback>; CH],
    faults: [ChannelFlags; CH],
}

/// Driver for one DMAC with `CH` channels.
///
/// All methods take `&self`; the descriptor tables and per-channel records
/// live behind a critical-section mutex so drivers and interrupt handlers can
/// share one controller. The controller must stay at a fixed address once
/// [`init`](Self::init) has published its tables to the hardware, which in
/// firmware means keeping it in a `static`.
pub struct Dmac<'r, D: DmacRegisters, const CH: usize = 12> {
    regs: D,
    config: DmacConfig,
    state: Mutex<RefCell<DmacState<'r, CH>>>,
}

impl<'r, D: DmacRegisters, const CH: usize> Dmac<'r, D, CH> {
    /// Create a controller driver over `regs`
    pub const fn new(regs: D, config: DmacConfig) -> Self {
        Self {
            regs,
            config,
            state: Mutex::new(RefCell::new(DmacState {
                descriptors: DescriptorTable([DmacDescriptor::EMPTY; CH]),
                writeback: DescriptorTable([DmacDescriptor::EMPTY; CH]),
                links: DescriptorTable([DmacDescriptor::EMPTY; CH]),
                rings: [None; CH],
                callbacks: [None; CH],
                faults: [ChannelFlags::empty(); CH],
            })),
        }
    }

    /// Number of channels
    pub const fn channels(&self) -> usize {
        CH
    }

    /// Register access, mainly for inspection in tests
    pub fn registers(&self) -> &D {
        &self.regs
    }

    fn check(channel: u8) -> PResult<usize> {
        let index = channel as usize;
        if index < CH {
            Ok(index)
        } else {
            Err(PeriphError::InvalidChannel)
        }
    }

    /// Reset the controller, install the descriptor tables, select
    /// round-robin arbitration and unmask the controller interrupt
    pub fn init(&self) {
        self.regs.reset();
        let (base, writeback) = critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            (
                state.descriptors.0.as_ptr() as usize as u32,
                state.writeback.0.as_ptr() as usize as u32,
            )
        });
        self.regs.set_descriptor_tables(base, writeback);
        self.regs.enable_round_robin();
        self.regs.enable();
        self.regs.unmask_interrupt(self.config.irq_priority);
        info!("DMAC ready, {} channels", CH);
    }

    /// Reset `channel` and program its trigger and priority
    pub fn config_channel(&self, channel: u8, trigger: u8, priority: u8) -> PResult<()> {
        Self::check(channel)?;
        self.regs.configure_channel(channel, trigger, priority);
        Ok(())
    }

    /// Configure `channel`, write its descriptor (chained to `then` if
    /// given) and enable it
    pub fn config_transfer(
        &self,
        channel: u8,
        first: &Block,
        then: Option<&Block>,
        trigger: u8,
        priority: u8,
    ) -> PResult<()> {
        let index = Self::check(channel)?;
        self.regs.configure_channel(channel, trigger, priority);
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            // A plain transfer never advances a ring
            state.rings[index] = None;
            let next = then.map(|block| {
                let link = &mut state.links.0[index];
                config_descriptor(link, block, None);
                link as *const DmacDescriptor as usize as u32
            });
            config_descriptor(&mut state.descriptors.0[index], first, next);
        });
        self.regs.enable_channel(channel);
        Ok(())
    }

    /// Drain every unread byte of `ring` into the fixed address `dest`.
    ///
    /// A wrapped ring is covered by two chained descriptors so the whole
    /// region moves in one run. When the transfer completes the ring head
    /// advances by the planned length. Fails with `EmptyBuffer` if the ring
    /// holds nothing.
    pub fn config_circular_buffer_to_static(
        &self,
        channel: u8,
        ring: &'r (dyn DmaRing + Sync),
        dest: u32,
        trigger: u8,
        priority: u8,
    ) -> PResult<RingSplit> {
        let index = Self::check(channel)?;
        let snapshot = ring.snapshot();
        let split = RingSplit::plan(&snapshot).ok_or(PeriphError::EmptyBuffer)?;

        self.regs.configure_channel(channel, trigger, priority);
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let head = Block::to_register(
                snapshot.base + snapshot.head as u32,
                dest,
                split.first(),
            );
            let next = split.second().map(|length| {
                let link = &mut state.links.0[index];
                config_descriptor(link, &Block::to_register(snapshot.base, dest, length), None);
                link as *const DmacDescriptor as usize as u32
            });
            config_descriptor(&mut state.descriptors.0[index], &head, next);
            state.rings[index] = Some(RingTransfer {
                ring,
                length: split.total(),
                valid: true,
            });
        });
        self.regs.enable_channel(channel);
        trace!("ring drain on channel {}: {} bytes", channel, split.total());
        Ok(split)
    }

    /// Stop `channel`. No completion is reported for an aborted transfer and
    /// a ring being drained keeps its head.
    pub fn abort_transfer(&self, channel: u8) {
        let Ok(index) = Self::check(channel) else {
            return;
        };
        self.regs.disable_channel(channel);
        critical_section::with(|cs| {
            if let Some(transfer) = self.state.borrow_ref_mut(cs).rings[index].as_mut() {
                transfer.valid = false;
            }
        });
    }

    /// True while `channel` has a transfer that has not completed
    pub fn chan_is_active(&self, channel: u8) -> bool {
        Self::check(channel).is_ok() && self.regs.channel_busy(channel)
    }

    /// Install the completion callback for `channel`
    pub fn register_callback(&self, channel: u8, callback: DmaCallback) -> PResult<()> {
        let index = Self::check(channel)?;
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).callbacks[index] = Some(callback);
        });
        Ok(())
    }

    /// Remove the completion callback for `channel`
    pub fn clear_callback(&self, channel: u8) {
        if let Ok(index) = Self::check(channel) {
            critical_section::with(|cs| {
                self.state.borrow_ref_mut(cs).callbacks[index] = None;
            });
        }
    }

    /// Suspend or error flags seen on `channel` since the last call
    pub fn take_faults(&self, channel: u8) -> ChannelFlags {
        match Self::check(channel) {
            Ok(index) => critical_section::with(|cs| {
                core::mem::take(&mut self.state.borrow_ref_mut(cs).faults[index])
            }),
            Err(_) => ChannelFlags::empty(),
        }
    }

    /// Copy of the base descriptor of `channel`
    pub fn descriptor(&self, channel: u8) -> PResult<DmacDescriptor> {
        let index = Self::check(channel)?;
        Ok(critical_section::with(|cs| {
            self.state.borrow_ref(cs).descriptors.0[index]
        }))
    }

    /// Copy of the chained descriptor of `channel`
    pub fn linked_descriptor(&self, channel: u8) -> PResult<DmacDescriptor> {
        let index = Self::check(channel)?;
        Ok(critical_section::with(|cs| {
            self.state.borrow_ref(cs).links.0[index]
        }))
    }

    /// Address the base descriptor of `channel` chains to when it has a link
    pub fn link_address(&self, channel: u8) -> PResult<u32> {
        let index = Self::check(channel)?;
        Ok(critical_section::with(|cs| {
            &self.state.borrow_ref(cs).links.0[index] as *const DmacDescriptor as usize as u32
        }))
    }

    /// Process every pending channel, lowest number first, reporting each
    /// event to `on_event`.
    ///
    /// Within one channel the order is suspend, complete, error. On
    /// completion a valid ring record advances its ring and is consumed,
    /// then the channel is disabled before `on_event` sees it. Suspend and
    /// error flags are cleared, logged and latched for
    /// [`take_faults`](Self::take_faults).
    pub fn service_pending(&self, mut on_event: impl FnMut(DmaEvent)) {
        while let Some((channel, flags)) = self.regs.pending() {
            let index = channel as usize;

            if flags.contains(ChannelFlags::SUSP) {
                self.regs.acknowledge(channel, ChannelFlags::SUSP);
                self.latch_fault(index, ChannelFlags::SUSP);
                warn!("DMA channel {} suspended", channel);
                on_event(DmaEvent::Suspended(channel));
            }

            if flags.contains(ChannelFlags::TCMPL) {
                let finished = critical_section::with(|cs| {
                    let mut state = self.state.borrow_ref_mut(cs);
                    match state.rings.get_mut(index).and_then(Option::as_mut) {
                        Some(transfer) if transfer.valid => {
                            transfer.valid = false;
                            Some(*transfer)
                        }
                        _ => None,
                    }
                });
                if let Some(transfer) = finished {
                    transfer.ring.move_head(transfer.length);
                }
                self.regs.acknowledge(channel, ChannelFlags::TCMPL);
                self.regs.disable_channel(channel);
                on_event(DmaEvent::Complete(channel));
            }

            if flags.contains(ChannelFlags::TERR) {
                self.regs.acknowledge(channel, ChannelFlags::TERR);
                self.latch_fault(index, ChannelFlags::TERR);
                warn!("DMA channel {} transfer error", channel);
                on_event(DmaEvent::TransferError(channel));
            }
        }
    }

    /// Shared DMAC interrupt handler body: dispatch completions to the
    /// registered callbacks
    pub fn handle_interrupt(&self) {
        self.service_pending(|event| {
            if let DmaEvent::Complete(channel) = event {
                let callback = critical_section::with(|cs| {
                    self.state
                        .borrow_ref(cs)
                        .callbacks
                        .get(channel as usize)
                        .copied()
                        .flatten()
                });
                if let Some(callback) = callback {
                    (callback.func)(channel, callback.context);
                }
            }
        });
    }

    fn latch_fault(&self, index: usize, flags: ChannelFlags) {
        critical_section::with(|cs| {
            if let Some(fault) = self.state.borrow_ref_mut(cs).faults.get_mut(index) {
                *fault = fault.union(flags);
            }
        });
    }
}

impl<'r, D: DmacRegisters, const CH: usize> DmaEngine for Dmac<'r, D, CH> {
    fn start_transfer(
        &self,
        channel: u8,
        first: &Block,
        then: Option<&Block>,
        trigger: u8,
        priority: u8,
    ) -> PResult<()> {
        self.config_transfer(channel, first, then, trigger, priority)
    }

    fn abort_transfer(&self, channel: u8) {
        Dmac::abort_transfer(self, channel)
    }

    fn chan_is_active(&self, channel: u8) -> bool {
        Dmac::chan_is_active(self, channel)
    }
}
