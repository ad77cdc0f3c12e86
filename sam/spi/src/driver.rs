//! SERCOM SPI master driver

use core::cell::RefCell;
use core::sync::atomic::AtomicU8;
use critical_section::Mutex;

use sam_core::{PResult, PeriphError, ServiceLock};
use sam_dma::{Block, DmaChannelConfig, DmaEngine};
use sam_sercom::{
    calc_sync_baud, PortRegisters, SercomInterrupts, SpiRegisters, SERCOM_IRQ_PRIORITY,
};
use sam_txq::{Slot, TransactionQueue};

use crate::config::SpiConfig;
use crate::transaction::{ChipSelect, SpiCallback, SpiKind, SpiPart, SpiTransaction};
use crate::SPI_QUEUE_LENGTH;

/// Byte clocked out while receiving
static DUMMY_BYTE: u8 = 0xFF;

/// Where the receive DMA dumps bytes clocked in during the out stage
static SINK: AtomicU8 = AtomicU8::new(0);

fn dummy_address() -> u32 {
    &DUMMY_BYTE as *const u8 as usize as u32
}

fn sink_address() -> u32 {
    SINK.as_ptr() as usize as u32
}

fn length(buffer: &[u8]) -> PResult<u16> {
    u16::try_from(buffer.len()).map_err(|_| PeriphError::InvalidState)
}

struct SpiState<'d, const N: usize> {
    queue: TransactionQueue<SpiTransaction<'d>, N>,
    /// The head of the queue is a session that owns the bus
    in_session: bool,
    /// A multi-part transfer holds CS between two of its parts
    chain: Option<Chain>,
}

/// Part of a multi-part transfer waiting to run under the asserted CS
#[derive(Clone, Copy)]
struct Chain {
    next: u8,
    cs: ChipSelect,
}

/// Result of ending a transaction, acted on once the state borrow is gone
struct Finished {
    callback: Option<SpiCallback>,
}

/// Transaction-queued SPI master on one SERCOM instance.
///
/// Transactions borrow their buffers for `'d`; the driver clocks them out
/// one at a time, with DMA for the directions that have a channel and the
/// DRE/TXC/RXC interrupts otherwise. The interrupt entry points
/// ([`handle_dre`](Self::handle_dre), [`handle_txc`](Self::handle_txc),
/// [`handle_rxc`](Self::handle_rxc) and
/// [`handle_dma_complete`](Self::handle_dma_complete)) must be wired to the
/// SERCOM vector and the DMA callback registry by the board.
///
/// DMA descriptors point into the transaction buffers and at driver
/// statics, so a driver with DMA enabled lives in a `static`.
pub struct SercomSpi<'d, S, P, M, const N: usize = SPI_QUEUE_LENGTH>
where
    S: SpiRegisters,
    P: PortRegisters,
    M: DmaEngine,
{
    regs: S,
    port: P,
    dma: M,
    config: SpiConfig,
    lock: ServiceLock,
    state: Mutex<RefCell<SpiState<'d, N>>>,
}

impl<'d, S, P, M, const N: usize> SercomSpi<'d, S, P, M, N>
where
    S: SpiRegisters,
    P: PortRegisters,
    M: DmaEngine,
{
    pub fn new(regs: S, port: P, dma: M, config: SpiConfig) -> Self {
        Self {
            regs,
            port,
            dma,
            config,
            lock: ServiceLock::new(),
            state: Mutex::new(RefCell::new(SpiState {
                queue: TransactionQueue::new(),
                in_session: false,
                chain: None,
            })),
        }
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    /// Register access, mainly for inspection in tests
    pub fn registers(&self) -> &S {
        &self.regs
    }

    /// Reset the SERCOM into SPI master mode and unmask its interrupt
    pub fn init(&self) {
        self.regs.reset();
        self.regs.configure_master();
        self.regs.unmask_interrupt(SERCOM_IRQ_PRIORITY);
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.in_session = false;
            state.chain = None;
        });
        info!(
            "SPI ready, tx dma {}, rx dma {}",
            self.config.tx_dma.is_some(),
            self.config.rx_dma.is_some()
        );
    }

    /// Queue a transaction that clocks out `out`, then reads `input.len()`
    /// bytes, with `cs` held low throughout. Returns the transaction id.
    pub fn start(
        &self,
        baud: u32,
        cs: ChipSelect,
        out: &'d [u8],
        input: &'d mut [u8],
    ) -> PResult<u8> {
        self.enqueue(baud, cs, out, input, None)
    }

    /// Like [`start`](Self::start), running `callback` when the transaction
    /// finishes. The transaction is cleared automatically, so it must not be
    /// passed to [`clear_transaction`](Self::clear_transaction).
    pub fn start_with_cb(
        &self,
        baud: u32,
        cs: ChipSelect,
        out: &'d [u8],
        input: &'d mut [u8],
        callback: SpiCallback,
    ) -> PResult<u8> {
        self.enqueue(baud, cs, out, input, Some(callback))
    }

    fn enqueue(
        &self,
        baud: u32,
        cs: ChipSelect,
        out: &'d [u8],
        input: &'d mut [u8],
        callback: Option<SpiCallback>,
    ) -> PResult<u8> {
        let out_length = length(out)?;
        let in_length = length(input)?;
        if out_length == 0 && in_length == 0 {
            return Err(PeriphError::InvalidState);
        }
        let id = critical_section::with(|cs_token| -> PResult<u8> {
            let mut state = self.state.borrow_ref_mut(cs_token);
            let slot = state.queue.add().ok_or(PeriphError::QueueFull)?;
            let t = state.queue.payload_mut(slot);
            *t = SpiTransaction::new(baud, cs);
            t.load(out, out_length, input, in_length);
            t.callback = callback;
            state.queue.set_valid(slot);
            Ok(state.queue.transaction(slot).id())
        })?;
        self.service();
        Ok(id)
    }

    /// Queue several transactions that share one chip select assertion.
    ///
    /// The parts run back to back: once the first part starts, nothing else
    /// is dispatched until the last one ends and CS is released. Either
    /// every part is queued or none is; the ids come back in part order.
    pub fn start_multi_part<I>(&self, parts: I, cs: ChipSelect) -> PResult<heapless::Vec<u8, N>>
    where
        I: IntoIterator<Item = SpiPart<'d>>,
    {
        let mut staged: heapless::Vec<(SpiPart<'d>, u16, u16), N> = heapless::Vec::new();
        for part in parts {
            let out_length = length(part.out)?;
            let in_length = length(part.input)?;
            if out_length == 0 && in_length == 0 {
                return Err(PeriphError::InvalidState);
            }
            staged
                .push((part, out_length, in_length))
                .map_err(|_| PeriphError::QueueFull)?;
        }

        let count = staged.len();
        let ids = critical_section::with(|cs_token| -> PResult<heapless::Vec<u8, N>> {
            let mut state = self.state.borrow_ref_mut(cs_token);
            if state.queue.free_slots() < count {
                debug!("SPI queue cannot take {} parts", count);
                return Err(PeriphError::QueueFull);
            }
            let mut ids = heapless::Vec::new();
            let mut previous: Option<Slot> = None;
            for (part, out_length, in_length) in staged {
                let slot = state.queue.add().ok_or(PeriphError::QueueFull)?;
                let id = state.queue.transaction(slot).id();
                let t = state.queue.payload_mut(slot);
                *t = SpiTransaction::new(part.baud, cs);
                t.load(part.out, out_length, part.input, in_length);
                t.kind = SpiKind::Chained { next: None };
                state.queue.set_valid(slot);
                if let Some(previous) = previous {
                    state.queue.payload_mut(previous).kind =
                        SpiKind::Chained { next: Some(id) };
                }
                previous = Some(slot);
                ids.push(id).map_err(|_| PeriphError::QueueFull)?;
            }
            Ok(ids)
        })?;
        self.service();
        Ok(ids)
    }

    /// Open a session: a queue entry that keeps `cs` asserted across any
    /// number of sub-transfers and blocks other transactions while it owns
    /// the bus.
    pub fn start_session(&self, baud: u32, cs: ChipSelect) -> PResult<u8> {
        let id = critical_section::with(|cs_token| -> PResult<u8> {
            let mut state = self.state.borrow_ref_mut(cs_token);
            let slot = state.queue.add().ok_or(PeriphError::QueueFull)?;
            let t = state.queue.payload_mut(slot);
            *t = SpiTransaction::new(baud, cs);
            t.kind = SpiKind::Session { simultaneous: false };
            // Nothing to clock yet
            state.queue.set_done(slot);
            state.queue.set_valid(slot);
            Ok(state.queue.transaction(slot).id())
        })?;
        self.service();
        Ok(id)
    }

    /// Run one write-then-read transfer inside session `id`
    pub fn start_session_transaction(
        &self,
        id: u8,
        out: &'d [u8],
        input: &'d mut [u8],
    ) -> PResult<()> {
        let out_length = length(out)?;
        let in_length = length(input)?;
        self.load_session(id, |t| t.load(out, out_length, input, in_length))
    }

    /// Run one full-duplex transfer inside session `id`: `input.len()` bytes
    /// of `out` are clocked out while the same number is read into `input`
    pub fn start_simultaneous_session_transaction(
        &self,
        id: u8,
        out: &'d [u8],
        input: &'d mut [u8],
    ) -> PResult<()> {
        let in_length = length(input)?;
        if out.len() < input.len() {
            return Err(PeriphError::InvalidState);
        }
        self.load_session(id, |t| {
            t.load(out, 0, input, in_length);
            t.kind = SpiKind::Session { simultaneous: true };
        })
    }

    fn load_session(&self, id: u8, load: impl FnOnce(&mut SpiTransaction<'d>)) -> PResult<()> {
        critical_section::with(|cs| -> PResult<()> {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.get(id).ok_or(PeriphError::NotFound)?;
            if !state.queue.payload(slot).kind.is_session() {
                return Err(PeriphError::NotSession);
            }
            if !state.queue.is_done(slot) {
                return Err(PeriphError::SessionPending);
            }
            load(state.queue.payload_mut(slot));
            state.queue.clear_done(slot);
            Ok(())
        })?;
        self.service();
        Ok(())
    }

    /// True while session `id` owns the bus
    pub fn session_active(&self, id: u8) -> bool {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            Self::session_is_head(&state, id)
        })
    }

    fn session_is_head(state: &SpiState<'d, N>, id: u8) -> bool {
        state.in_session && state.queue.transaction(state.queue.head()).id() == id
    }

    /// Close session `id`, releasing its chip select if it owns the bus.
    ///
    /// Fails with `LockHeld` if the service routine is running, and with
    /// `Busy` while a sub-transfer is in flight.
    pub fn end_session(&self, id: u8) -> PResult<()> {
        if !self.lock.try_acquire() {
            return Err(PeriphError::LockHeld);
        }
        let result = critical_section::with(|cs| -> PResult<()> {
            let mut state = self.state.borrow_ref_mut(cs);
            let is_active = Self::session_is_head(&state, id);
            let slot = state.queue.get(id).ok_or(PeriphError::NotFound)?;
            state.queue.invalidate(slot)?;
            if is_active {
                state.in_session = false;
                state.queue.payload(slot).cs.release(&self.port);
                debug!("SPI session {} ended", id);
            }
            Ok(())
        });
        self.lock.release();
        if result.is_ok() {
            self.service();
        }
        result
    }

    /// Nudge the service routine, then report whether `id` has finished
    pub fn transaction_done(&self, id: u8) -> bool {
        self.service();
        critical_section::with(|cs| self.state.borrow_ref(cs).queue.is_done_id(id))
    }

    /// [`transaction_done`](Self::transaction_done) for `nb::block!`
    pub fn poll(&self, id: u8) -> nb::Result<(), PeriphError> {
        if self.transaction_done(id) {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Free a finished transaction and hand its buffers back.
    ///
    /// Sessions are closed with [`end_session`](Self::end_session) instead.
    pub fn clear_transaction(&self, id: u8) -> PResult<(&'d [u8], &'d mut [u8])> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.get(id).ok_or(PeriphError::NotFound)?;
            if state.queue.payload(slot).kind.is_session() {
                return Err(PeriphError::InvalidState);
            }
            state.queue.invalidate(slot)?;
            Ok(state.queue.payload_mut(slot).take_buffers())
        })
    }

    /// Take the buffers of finished transaction `id` without freeing it
    pub fn take_buffers(&self, id: u8) -> PResult<(&'d [u8], &'d mut [u8])> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.get(id).ok_or(PeriphError::NotFound)?;
            if !state.queue.is_done(slot) {
                return Err(PeriphError::Busy);
            }
            Ok(state.queue.payload_mut(slot).take_buffers())
        })
    }

    /// Start the next pending transaction if the bus is free
    pub fn service(&self) {
        if !self.lock.try_acquire() {
            return;
        }
        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            self.service_locked(&mut state)
        });
        self.lock.release();
        self.after_end(finished);
    }

    fn service_locked(&self, state: &mut SpiState<'d, N>) -> Option<Finished> {
        if state.queue.head_active() {
            return None;
        }

        let slot = match self.chained_slot(state) {
            Some(slot) => slot,
            None if state.in_session => state.queue.head(),
            None => state.queue.next()?,
        };

        if state.queue.payload(slot).kind.is_session() && !state.in_session {
            state.in_session = true;
            debug!(
                "SPI session {} started",
                state.queue.transaction(slot).id()
            );
        }
        if state.in_session && state.queue.is_done(slot) {
            return None;
        }
        state.queue.activate(slot).ok()?;
        match self.begin(state.queue.payload_mut(slot)) {
            Ok(()) => None,
            Err(e) => Some(self.abort_transaction(state, slot, e)),
        }
    }

    /// Next part of the multi-part transfer holding CS, if one is running
    fn chained_slot(&self, state: &mut SpiState<'d, N>) -> Option<Slot> {
        let chain = state.chain?;
        match state.queue.get(chain.next) {
            Some(slot) => {
                state.queue.select(slot);
                Some(slot)
            }
            None => {
                // The remaining parts were cleared before they ran
                debug!("SPI part {} gone, releasing CS", chain.next);
                state.chain = None;
                chain.cs.release(&self.port);
                None
            }
        }
    }

    fn begin(&self, t: &mut SpiTransaction<'d>) -> PResult<()> {
        let baud = match calc_sync_baud(t.baud, self.config.core_frequency) {
            Ok(baud) => baud,
            Err(_) => {
                warn!(
                    "SPI baud {} unachievable, using {}",
                    t.baud,
                    self.config.fallback_baud
                );
                calc_sync_baud(self.config.fallback_baud, self.config.core_frequency)
                    .unwrap_or(u8::MAX)
            }
        };
        self.regs.set_baud(baud);
        self.regs.enable();
        t.cs.assert(&self.port);

        let data = self.regs.data_address();
        let tx = self.config.tx_dma.filter(|_| t.out_length != 0);
        let rx = self.config.rx_dma.filter(|_| t.in_length != 0);

        match (tx, rx) {
            (Some(tx), Some(rx)) => {
                // Full duplex for the whole transaction: RX sinks the bytes
                // clocked in during the out stage, TX pads the in stage
                self.regs.set_receiver(true);
                t.rx_started = true;
                let input = t.input.as_mut_ptr() as usize as u32;
                self.start_dma(
                    rx,
                    &Block::fixed(data, sink_address(), t.out_length),
                    Some(&Block::from_register(data, input, t.in_length)),
                )?;
                let out = t.out.as_ptr() as usize as u32;
                self.start_dma(
                    tx,
                    &Block::to_register(out, data, t.out_length),
                    Some(&Block::fixed(dummy_address(), data, t.in_length)),
                )?;
            }
            (Some(tx), None) => {
                let out = t.out.as_ptr() as usize as u32;
                self.start_dma(tx, &Block::to_register(out, data, t.out_length), None)?;
            }
            // DRE does the right thing for the interrupt driven out stage
            // and for transactions without one
            _ => self.regs.enable_interrupts(SercomInterrupts::DRE),
        }
        Ok(())
    }

    fn start_dma(
        &self,
        dma: DmaChannelConfig,
        first: &Block,
        then: Option<&Block>,
    ) -> PResult<()> {
        let result = self
            .dma
            .start_transfer(dma.channel, first, then, dma.trigger, dma.priority);
        if let Err(e) = result {
            error!("SPI DMA start on channel {} failed: {}", dma.channel, e);
        }
        result
    }

    fn start_reception(&self, t: &mut SpiTransaction<'d>) -> PResult<()> {
        self.regs.set_receiver(true);
        let data = self.regs.data_address();

        match self.config.rx_dma {
            Some(rx) => {
                let input = t.input.as_mut_ptr() as usize as u32;
                self.start_dma(rx, &Block::from_register(data, input, t.in_length), None)?;
            }
            None => self.regs.enable_interrupts(SercomInterrupts::RXC),
        }
        t.rx_started = true;

        match self.config.tx_dma {
            Some(tx) if !t.kind.is_simultaneous() => {
                self.start_dma(tx, &Block::fixed(dummy_address(), data, t.in_length), None)?;
            }
            Some(tx) => {
                let out = t.out.as_ptr() as usize as u32;
                self.start_dma(tx, &Block::to_register(out, data, t.in_length), None)?;
            }
            None => {
                t.dummy_bytes_out = 0;
                self.regs.enable_interrupts(SercomInterrupts::DRE);
            }
        }
        Ok(())
    }

    fn end_transaction(&self, state: &mut SpiState<'d, N>, slot: Slot) -> Finished {
        self.regs
            .disable_interrupts(SercomInterrupts::DRE | SercomInterrupts::RXC);
        state.queue.set_done(slot);

        let t = state.queue.payload(slot);
        let (cs, kind, callback) = (t.cs, t.kind, t.callback);
        match kind {
            SpiKind::Session { .. } => {}
            SpiKind::Chained { next: Some(next) } => state.chain = Some(Chain { next, cs }),
            SpiKind::Single | SpiKind::Chained { next: None } => {
                state.chain = None;
                cs.release(&self.port);
            }
        }
        self.regs.set_receiver(false);
        self.regs.disable();

        if callback.is_some() {
            // Cannot fail, the slot is no longer active
            let _ = state.queue.invalidate(slot);
        }
        Finished { callback }
    }

    /// End a transaction whose DMA could not be started. CS is released
    /// even mid-session, and the rest of a multi-part transfer is marked
    /// done without running.
    fn abort_transaction(
        &self,
        state: &mut SpiState<'d, N>,
        slot: Slot,
        error: PeriphError,
    ) -> Finished {
        error!(
            "SPI transaction {} abandoned: {}",
            state.queue.transaction(slot).id(),
            error
        );
        for dma in [self.config.tx_dma, self.config.rx_dma].into_iter().flatten() {
            self.dma.abort_transfer(dma.channel);
        }
        let cs = state.queue.payload(slot).cs;
        let finished = self.end_transaction(state, slot);
        cs.release(&self.port);

        while let Some(chain) = state.chain.take() {
            let Some(part) = state.queue.get(chain.next) else {
                break;
            };
            state.queue.set_done(part);
            if let Some(next) = state.queue.payload(part).kind.chained_next() {
                state.chain = Some(Chain { next, cs });
            }
        }
        finished
    }

    fn after_end(&self, finished: Option<Finished>) {
        let Some(finished) = finished else {
            return;
        };
        if let Some(callback) = finished.callback {
            (callback.func)(callback.context);
        }
        self.service();
    }

    /// Data register empty interrupt
    pub fn handle_dre(&self) {
        let virtual_txc = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let Some(slot) = state.queue.get_active() else {
                return false;
            };
            let t = state.queue.payload_mut(slot);
            let mut virtual_txc = false;

            if !t.rx_started && t.bytes_out < t.out_length {
                self.send_out_byte(t);
            } else if t.kind.is_simultaneous() && t.rx_started {
                if t.bytes_out < t.in_length {
                    self.send_out_byte(t);
                } else {
                    self.regs.disable_interrupts(SercomInterrupts::DRE);
                }
            } else if t.in_length == 0 {
                // Let the last byte leave the shift register
                self.regs.disable_interrupts(SercomInterrupts::DRE);
                self.regs.enable_interrupts(SercomInterrupts::TXC);
            } else if !t.rx_started {
                // The out stage is over, reception starts from TXC
                self.regs.disable_interrupts(SercomInterrupts::DRE);
                if t.bytes_out != 0 {
                    self.regs.enable_interrupts(SercomInterrupts::TXC);
                } else {
                    // Nothing was sent so TXC will never be raised
                    virtual_txc = true;
                }
            } else if t.dummy_bytes_out < t.in_length {
                self.regs.write_data(DUMMY_BYTE);
                t.dummy_bytes_out += 1;
            } else {
                self.regs.disable_interrupts(SercomInterrupts::DRE);
            }

            if self.config.rx_dma.is_none() && t.rx_started {
                // RXC gets disabled whenever the SERCOM interrupt runs
                self.regs.enable_interrupts(SercomInterrupts::RXC);
            }
            virtual_txc
        });

        if virtual_txc {
            self.handle_txc();
        }
    }

    fn send_out_byte(&self, t: &mut SpiTransaction<'d>) {
        let byte = t.out.get(t.bytes_out as usize).copied().unwrap_or(DUMMY_BYTE);
        self.regs.write_data(byte);
        t.bytes_out += 1;
    }

    /// Transmit complete interrupt
    pub fn handle_txc(&self) {
        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.get_active()?;
            self.regs.disable_interrupts(SercomInterrupts::TXC);
            let t = state.queue.payload_mut(slot);
            if t.in_length == 0 {
                return Some(self.end_transaction(&mut state, slot));
            }
            match self.start_reception(t) {
                Ok(()) => None,
                Err(e) => Some(self.abort_transaction(&mut state, slot, e)),
            }
        });
        self.after_end(finished);
    }

    /// Receive complete interrupt
    pub fn handle_rxc(&self) {
        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.get_active()?;
            let byte = self.regs.read_data();
            let t = state.queue.payload_mut(slot);
            if let Some(dest) = t.input.get_mut(t.bytes_in as usize) {
                *dest = byte;
            }
            t.bytes_in = t.bytes_in.saturating_add(1);

            if t.bytes_in >= t.in_length {
                Some(self.end_transaction(&mut state, slot))
            } else {
                if self.config.rx_dma.is_none() {
                    self.regs.enable_interrupts(SercomInterrupts::RXC);
                }
                None
            }
        });
        self.after_end(finished);
    }

    /// DMA completion on one of the driver's channels
    pub fn handle_dma_complete(&self, channel: u8) {
        let tx_channel = self.config.tx_dma.map(|dma| dma.channel);
        let rx_channel = self.config.rx_dma.map(|dma| dma.channel);

        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            // A padding transfer may finish after the transaction it served
            let slot = state.queue.get_active()?;

            if tx_channel == Some(channel) && !state.queue.payload(slot).rx_started {
                // Out stage sent, wait for the last byte to leave
                self.regs.enable_interrupts(SercomInterrupts::TXC);
                None
            } else if rx_channel == Some(channel) {
                Some(self.end_transaction(&mut state, slot))
            } else {
                None
            }
        });
        self.after_end(finished);
    }

    /// SERCOM interrupt body: run the handler of every raised and enabled
    /// flag
    pub fn handle_interrupt(&self) {
        let pending = self.regs.pending_interrupts();
        if pending.contains(SercomInterrupts::DRE) {
            self.handle_dre();
        }
        if pending.contains(SercomInterrupts::TXC) {
            self.handle_txc();
        }
        if pending.contains(SercomInterrupts::RXC) {
            self.handle_rxc();
        }
    }
}
