//! SERCOM I2C master driver

use core::cell::RefCell;
use critical_section::Mutex;

use sam_core::{PResult, PeriphError, ServiceLock, SleepGate};
use sam_dma::{Block, DmaEngine};
use sam_sercom::{
    calc_i2c_baud, BusState, I2cCommand, I2cRegisters, SercomInterrupts, SERCOM_IRQ_PRIORITY,
};
use sam_txq::{Slot, TransactionQueue};

use crate::config::{I2cConfig, I2cDmaConfig, I2C_DMA_MAX};
use crate::transaction::{I2cBuffers, I2cCallback, I2cKind, I2cState, I2cTransaction};
use crate::I2C_QUEUE_LENGTH;

const BUS_INTERRUPTS: SercomInterrupts = SercomInterrupts::MB.union(SercomInterrupts::SB);

const ALL_INTERRUPTS: SercomInterrupts = BUS_INTERRUPTS.union(SercomInterrupts::ERROR);

fn length(buffer: &[u8]) -> PResult<u16> {
    u16::try_from(buffer.len()).map_err(|_| PeriphError::InvalidState)
}

fn check_device(device: u8) -> PResult<()> {
    if device < 128 {
        Ok(())
    } else {
        Err(PeriphError::InvalidState)
    }
}

struct I2cShared<'d, const N: usize> {
    queue: TransactionQueue<I2cTransaction<'d>, N>,
    /// A transaction is pending but the bus was not idle
    wait_for_idle: bool,
    /// The driver holds one sleep inhibit for a bus-idle wait
    holding_sleep: bool,
}

/// Result of ending a transaction, acted on once the state borrow is gone
struct Finished {
    state: I2cState,
    callback: Option<I2cCallback>,
}

/// Transaction-queued I2C master on one SERCOM instance.
///
/// Supports generic write-then-read transfers, register reads and writes,
/// and a scan of every 7-bit address. Stages of at least
/// [`I2cConfig::dma_threshold`] bytes move through the single DMA channel
/// when one is configured; everything else is stepped by the MB and SB
/// interrupts.
///
/// After a DMA driven write the bus is not idle straight away. The driver
/// parks the transaction in [`I2cState::WaitForRx`] or
/// [`I2cState::WaitForDone`], holds a [`SleepGate`] inhibit, and lets
/// [`service`](Self::service) finish the step once the bus reports idle.
/// The main loop therefore has to keep calling `service` (or
/// [`transaction_done`](Self::transaction_done)).
///
/// A DMA register write reads the register byte out of the driver itself,
/// so a driver with DMA enabled must not move while transactions are
/// queued; keep it in a `static`.
pub struct SercomI2c<'d, S, M, const N: usize = I2C_QUEUE_LENGTH>
where
    S: I2cRegisters,
    M: DmaEngine,
{
    regs: S,
    dma: M,
    sleep: &'d SleepGate,
    config: I2cConfig,
    lock: ServiceLock,
    state: Mutex<RefCell<I2cShared<'d, N>>>,
}

impl<'d, S, M, const N: usize> SercomI2c<'d, S, M, N>
where
    S: I2cRegisters,
    M: DmaEngine,
{
    pub fn new(regs: S, dma: M, sleep: &'d SleepGate, config: I2cConfig) -> Self {
        Self {
            regs,
            dma,
            sleep,
            config,
            lock: ServiceLock::new(),
            state: Mutex::new(RefCell::new(I2cShared {
                queue: TransactionQueue::new(),
                wait_for_idle: false,
                holding_sleep: false,
            })),
        }
    }

    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Register access, mainly for inspection in tests
    pub fn registers(&self) -> &S {
        &self.regs
    }

    /// Reset the SERCOM into I2C master mode, program the baud rate and
    /// force the bus state to idle
    pub fn init(&self) {
        self.regs.reset();
        self.regs.configure_master(self.config.mode);
        let baud = calc_i2c_baud(self.config.mode, self.config.core_frequency);
        self.regs.set_baud(baud);
        self.regs.unmask_interrupt(SERCOM_IRQ_PRIORITY);
        self.regs.enable();
        // The master only sees the bus as idle after a stop condition, which
        // never comes when it is alone on the bus
        self.regs.force_idle();
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).wait_for_idle = false);
        info!(
            "I2C ready, baud {}/{}, dma {}",
            baud.high,
            baud.low,
            self.config.dma.is_some()
        );
    }

    /// Queue a transfer to `device` that writes `out`, then reads
    /// `input.len()` bytes after a repeated start. Either buffer may be
    /// empty, not both.
    pub fn start_generic(&self, device: u8, out: &'d [u8], input: &'d mut [u8]) -> PResult<u8> {
        check_device(device)?;
        let out_length = length(out)?;
        let in_length = length(input)?;
        if out_length == 0 && in_length == 0 {
            return Err(PeriphError::InvalidState);
        }
        let dma_out = self.config.uses_dma(out_length);
        let dma_in = self.config.uses_dma(in_length);
        let kind = I2cKind::Generic {
            out,
            input,
            bytes_out: 0,
            bytes_in: 0,
        };
        self.enqueue(I2cTransaction::new(device, kind), dma_out, dma_in, None)
    }

    /// Queue a write of `data` to `register` of `device`
    pub fn start_reg_write(&self, device: u8, register: u8, data: &'d [u8]) -> PResult<u8> {
        self.reg_write(device, register, data, None)
    }

    /// Like [`start_reg_write`](Self::start_reg_write), running `callback`
    /// with the terminal state when the transaction ends. The transaction is
    /// cleared automatically.
    pub fn start_reg_write_with_cb(
        &self,
        device: u8,
        register: u8,
        data: &'d [u8],
        callback: I2cCallback,
    ) -> PResult<u8> {
        self.reg_write(device, register, data, Some(callback))
    }

    fn reg_write(
        &self,
        device: u8,
        register: u8,
        data: &'d [u8],
        callback: Option<I2cCallback>,
    ) -> PResult<u8> {
        check_device(device)?;
        let data_length = length(data)?;
        // The register byte counts towards ADDR.LEN
        let dma_out = self.config.uses_dma(data_length) && data_length < I2C_DMA_MAX;
        let kind = I2cKind::RegWrite {
            register,
            data,
            position: 0,
        };
        self.enqueue(I2cTransaction::new(device, kind), dma_out, false, callback)
    }

    /// Queue a read of `data.len()` bytes starting at `register` of `device`
    pub fn start_reg_read(&self, device: u8, register: u8, data: &'d mut [u8]) -> PResult<u8> {
        self.reg_read(device, register, data, None)
    }

    /// Like [`start_reg_read`](Self::start_reg_read), running `callback`
    /// with the terminal state when the transaction ends. The transaction is
    /// cleared automatically.
    pub fn start_reg_read_with_cb(
        &self,
        device: u8,
        register: u8,
        data: &'d mut [u8],
        callback: I2cCallback,
    ) -> PResult<u8> {
        self.reg_read(device, register, data, Some(callback))
    }

    fn reg_read(
        &self,
        device: u8,
        register: u8,
        data: &'d mut [u8],
        callback: Option<I2cCallback>,
    ) -> PResult<u8> {
        check_device(device)?;
        let data_length = length(data)?;
        if data_length == 0 {
            return Err(PeriphError::InvalidState);
        }
        let dma_in = self.config.uses_dma(data_length);
        let kind = I2cKind::RegRead {
            register,
            data,
            position: 0,
        };
        self.enqueue(I2cTransaction::new(device, kind), false, dma_in, callback)
    }

    /// Queue a probe of every address from 1 to 127. Query the outcome with
    /// [`device_available`](Self::device_available) once it is done.
    pub fn start_scan(&self) -> PResult<u8> {
        // Address 0 is the general call
        let kind = I2cKind::Scan {
            results: 0,
            address: 1,
        };
        self.enqueue(I2cTransaction::new(0, kind), false, false, None)
    }

    fn enqueue(
        &self,
        transaction: I2cTransaction<'d>,
        dma_out: bool,
        dma_in: bool,
        callback: Option<I2cCallback>,
    ) -> PResult<u8> {
        let id = critical_section::with(|cs| -> PResult<u8> {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.add().ok_or(PeriphError::QueueFull)?;
            let t = state.queue.payload_mut(slot);
            *t = transaction;
            t.dma_out = dma_out;
            t.dma_in = dma_in;
            t.callback = callback;
            state.queue.set_valid(slot);
            Ok(state.queue.transaction(slot).id())
        })?;
        self.service();
        Ok(id)
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

    pub fn transaction_state(&self, id: u8) -> PResult<I2cState> {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            let slot = state.queue.get(id).ok_or(PeriphError::NotFound)?;
            Ok(state.queue.payload(slot).state)
        })
    }

    /// Free transaction `id` and hand its buffers back. Fails with `Busy`
    /// while it is on the bus.
    pub fn clear_transaction(&self, id: u8) -> PResult<I2cBuffers<'d>> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.get(id).ok_or(PeriphError::NotFound)?;
            state.queue.invalidate(slot)?;
            Ok(state.queue.payload_mut(slot).take_buffers())
        })
    }

    /// Take the buffers of finished transaction `id` without freeing it
    pub fn take_buffers(&self, id: u8) -> PResult<I2cBuffers<'d>> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.get(id).ok_or(PeriphError::NotFound)?;
            if !state.queue.is_done(slot) {
                return Err(PeriphError::Busy);
            }
            Ok(state.queue.payload_mut(slot).take_buffers())
        })
    }

    /// Bitmap of the addresses that acknowledged during scan `id`
    pub fn scan_results(&self, id: u8) -> PResult<u128> {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            let slot = state.queue.get(id).ok_or(PeriphError::NotFound)?;
            match state.queue.payload(slot).kind {
                I2cKind::Scan { results, .. } => Ok(results),
                _ => Err(PeriphError::InvalidState),
            }
        })
    }

    /// Whether `address` acknowledged during scan `id`
    pub fn device_available(&self, id: u8, address: u8) -> PResult<bool> {
        let results = self.scan_results(id)?;
        Ok(address < 128 && results & (1u128 << address) != 0)
    }

    /// Finish a bus-idle wait or start the next pending transaction
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

    fn service_locked(&self, state: &mut I2cShared<'d, N>) -> Option<Finished> {
        let bus_idle = self.regs.status().bus_state() == BusState::Idle;

        if let Some(slot) = state.queue.get_active() {
            if !bus_idle {
                return None;
            }
            match state.queue.payload(slot).state {
                I2cState::WaitForRx => {
                    self.release_sleep(state);
                    self.begin_rx(state.queue.payload_mut(slot));
                }
                I2cState::WaitForDone => {
                    self.release_sleep(state);
                    state.queue.payload_mut(slot).state = I2cState::Done;
                    return Some(self.end_transaction(state, slot));
                }
                _ => {}
            }
            return None;
        }

        if state.wait_for_idle {
            if !bus_idle {
                return None;
            }
            state.wait_for_idle = false;
        }

        let slot = state.queue.next()?;
        if !bus_idle {
            trace!("I2C bus not idle, transaction waits");
            state.wait_for_idle = true;
            return None;
        }
        state.queue.activate(slot).ok()?;
        self.begin(state.queue.payload_mut(slot));
        None
    }

    fn hold_sleep(&self, state: &mut I2cShared<'d, N>) {
        if !state.holding_sleep {
            state.holding_sleep = true;
            self.sleep.inhibit();
        }
    }

    fn release_sleep(&self, state: &mut I2cShared<'d, N>) {
        if state.holding_sleep {
            state.holding_sleep = false;
            self.sleep.allow();
        }
    }

    fn begin(&self, t: &mut I2cTransaction<'d>) {
        match t.kind {
            I2cKind::Generic { .. } => self.begin_generic(t),
            I2cKind::RegWrite { .. } | I2cKind::RegRead { .. } => self.begin_register(t),
            I2cKind::Scan { address, .. } => {
                t.state = I2cState::Tx;
                self.regs.enable_interrupts(SercomInterrupts::MB);
                self.regs.write_addr(address << 1, None);
            }
        }
    }

    fn begin_generic(&self, t: &mut I2cTransaction<'d>) {
        let (out, out_length) = match &t.kind {
            I2cKind::Generic { out, .. } => (out.as_ptr() as usize as u32, out.len() as u16),
            _ => return,
        };
        let in_only = out_length == 0;

        match self.config.dma {
            Some(dma) if in_only && t.dma_in => self.begin_in_dma(t, dma),
            Some(dma) if !in_only && t.dma_out => {
                t.state = I2cState::Tx;
                let data = self.regs.data_address();
                self.start_dma(dma, dma.tx_trigger, &Block::to_register(out, data, out_length), None);
                self.regs.enable_interrupts(SercomInterrupts::ERROR);
                self.regs.write_addr(t.address, Some(out_length as u8));
            }
            _ => {
                t.state = if in_only { I2cState::Rx } else { I2cState::Tx };
                self.regs.enable_interrupts(BUS_INTERRUPTS);
                self.regs.write_addr(t.address | in_only as u8, None);
            }
        }
    }

    fn begin_register(&self, t: &mut I2cTransaction<'d>) {
        match (&t.kind, self.config.dma) {
            (I2cKind::RegWrite { register, data, .. }, Some(dma)) if t.dma_out => {
                let length = data.len() as u16;
                let register = register as *const u8 as usize as u32;
                let source = data.as_ptr() as usize as u32;
                let data_reg = self.regs.data_address();
                self.start_dma(
                    dma,
                    dma.tx_trigger,
                    &Block::to_register(register, data_reg, 1),
                    Some(&Block::to_register(source, data_reg, length)),
                );
                t.state = I2cState::Tx;
                self.regs.enable_interrupts(SercomInterrupts::ERROR);
                self.regs.write_addr(t.address, Some(length as u8 + 1));
            }
            _ => {
                t.state = I2cState::RegAddr;
                self.regs.enable_interrupts(BUS_INTERRUPTS);
                self.regs.write_addr(t.address, None);
            }
        }
    }

    /// Start the read stage, with DMA when the transaction qualifies
    fn begin_rx(&self, t: &mut I2cTransaction<'d>) {
        match self.config.dma {
            Some(dma) if t.dma_in => self.begin_in_dma(t, dma),
            _ => {
                t.state = I2cState::Rx;
                self.regs.enable_interrupts(BUS_INTERRUPTS);
                self.regs.write_addr(t.address | 1, None);
            }
        }
    }

    fn begin_in_dma(&self, t: &mut I2cTransaction<'d>, dma: I2cDmaConfig) {
        let length = t.in_length();
        let input = t.in_address();
        let data = self.regs.data_address();
        self.start_dma(dma, dma.rx_trigger, &Block::from_register(data, input, length), None);
        self.regs.disable_interrupts(BUS_INTERRUPTS);
        self.regs.enable_interrupts(SercomInterrupts::ERROR);
        // ACK every byte, the length counter ends the read
        self.regs.set_ack_action(false);
        t.state = I2cState::Rx;
        self.regs.write_addr(t.address | 1, Some(length as u8));
    }

    fn start_dma(&self, dma: I2cDmaConfig, trigger: u8, first: &Block, then: Option<&Block>) {
        if let Err(e) = self
            .dma
            .start_transfer(dma.channel, first, then, trigger, dma.priority)
        {
            error!("I2C DMA start on channel {} failed: {}", dma.channel, e);
        }
    }

    fn end_transaction(&self, state: &mut I2cShared<'d, N>, slot: Slot) -> Finished {
        state.queue.set_done(slot);
        self.regs.disable_interrupts(ALL_INTERRUPTS);
        self.release_sleep(state);

        let t = state.queue.payload(slot);
        let result = t.state;
        if result.is_error() {
            warn!(
                "I2C transaction {} to device {} ended with {}",
                state.queue.transaction(slot).id(),
                t.address >> 1,
                result
            );
        }
        let callback = t.callback;
        if callback.is_some() {
            // Cannot fail, the slot is no longer active
            let _ = state.queue.invalidate(slot);
        }
        Finished {
            state: result,
            callback,
        }
    }

    fn after_end(&self, finished: Option<Finished>) {
        let Some(finished) = finished else {
            return;
        };
        if let Some(callback) = finished.callback {
            (callback.func)(finished.state, callback.context);
        }
        self.service();
    }

    /// Master on bus interrupt: an address or data byte went out, or the
    /// bus failed
    pub fn handle_master_on_bus(&self) {
        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            self.regs
                .clear_interrupts(SercomInterrupts::MB | SercomInterrupts::ERROR);
            let slot = state.queue.get_active()?;
            let status = self.regs.status();
            let t = state.queue.payload_mut(slot);

            if status.bus_error() {
                t.state = I2cState::BusError;
            } else if status.arbitration_lost() {
                t.state = I2cState::ArbitrationLost;
            } else if let I2cKind::Scan { results, address } = &mut t.kind {
                if !status.rx_nack() {
                    *results |= 1u128 << *address;
                }
                *address += 1;
                if *address < 128 {
                    self.regs.write_addr(*address << 1, None);
                    return None;
                }
                self.regs.command(I2cCommand::Stop);
                info!("I2C scan found {} devices", results.count_ones());
                t.state = I2cState::Done;
            } else if status.rx_nack() {
                // Release the bus so the next transaction finds it idle
                self.regs.command(I2cCommand::Stop);
                t.state = I2cState::SlaveNack;
            } else if !self.master_step(t) {
                return None;
            }
            Some(self.end_transaction(&mut state, slot))
        });
        self.after_end(finished);
    }

    /// Advance an interrupt driven write by one byte. True once the
    /// transaction has ended.
    fn master_step(&self, t: &mut I2cTransaction<'d>) -> bool {
        let read = match &mut t.kind {
            I2cKind::Generic {
                out,
                input,
                bytes_out,
                ..
            } => match out.get(*bytes_out as usize) {
                Some(&byte) => {
                    self.regs.write_data(byte);
                    *bytes_out += 1;
                    return false;
                }
                None => !input.is_empty(),
            },
            I2cKind::RegWrite {
                register,
                data,
                position,
            } => {
                if t.state != I2cState::Tx {
                    self.regs.write_data(*register);
                    t.state = I2cState::Tx;
                    return false;
                }
                match data.get(*position as usize) {
                    Some(&byte) => {
                        self.regs.write_data(byte);
                        *position += 1;
                        return false;
                    }
                    None => false,
                }
            }
            I2cKind::RegRead { register, .. } => {
                if t.state != I2cState::Rx {
                    self.regs.write_data(*register);
                    t.state = I2cState::Rx;
                    return false;
                }
                true
            }
            I2cKind::Scan { .. } => return false,
        };

        if read {
            // Repeated start for the read stage
            self.begin_rx(t);
            false
        } else {
            self.regs.command(I2cCommand::Stop);
            t.state = I2cState::Done;
            true
        }
    }

    /// Slave on bus interrupt: a byte was received
    pub fn handle_slave_on_bus(&self) {
        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            self.regs.clear_interrupts(SercomInterrupts::SB);
            let slot = state.queue.get_active()?;
            let t = state.queue.payload_mut(slot);
            let (buffer, position) = match &mut t.kind {
                I2cKind::Generic {
                    input, bytes_in, ..
                } => (input, bytes_in),
                I2cKind::RegRead { data, position, .. } => (data, position),
                _ => return None,
            };

            let last = *position as usize + 1 >= buffer.len();
            // NACK the last byte and stop once it is read
            self.regs.set_ack_action(last);
            if last {
                self.regs.command(I2cCommand::Stop);
            }
            let byte = self.regs.read_data();
            if let Some(dest) = buffer.get_mut(*position as usize) {
                *dest = byte;
            }
            *position = position.saturating_add(1);

            if !last {
                self.regs.command(I2cCommand::ReadByte);
                return None;
            }
            t.state = I2cState::Done;
            Some(self.end_transaction(&mut state, slot))
        });
        self.after_end(finished);
    }

    /// Error interrupt, only enabled while DMA drives the transfer
    pub fn handle_error(&self) {
        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            self.regs.clear_interrupts(SercomInterrupts::ERROR);
            let slot = state.queue.get_active()?;
            if let Some(dma) = self.config.dma {
                self.dma.abort_transfer(dma.channel);
            }

            let status = self.regs.status();
            let t = state.queue.payload_mut(slot);
            t.state = if status.bus_error() {
                I2cState::BusError
            } else if status.arbitration_lost() {
                I2cState::ArbitrationLost
            } else if status.length_error() {
                // The slave NACKed before the length counter ran out
                I2cState::SlaveNack
            } else {
                I2cState::BusError
            };
            Some(self.end_transaction(&mut state, slot))
        });
        self.after_end(finished);
    }

    /// DMA completion on the driver's channel
    pub fn handle_dma_complete(&self, channel: u8) {
        if self.config.dma.map(|dma| dma.channel) != Some(channel) {
            return;
        }
        let finished = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let slot = state.queue.get_active()?;
            let t = state.queue.payload_mut(slot);

            let next = match (&t.kind, t.state) {
                (I2cKind::Generic { input, .. }, I2cState::Tx) if !input.is_empty() => {
                    I2cState::WaitForRx
                }
                (I2cKind::Generic { .. }, I2cState::Tx) | (I2cKind::RegWrite { .. }, _) => {
                    I2cState::WaitForDone
                }
                (I2cKind::Generic { .. }, _) | (I2cKind::RegRead { .. }, _) => I2cState::Done,
                (I2cKind::Scan { .. }, _) => return None,
            };
            t.state = next;

            if next == I2cState::Done {
                Some(self.end_transaction(&mut state, slot))
            } else {
                // The bus goes idle soon after the last byte, poll for it
                // instead of sleeping through it
                self.hold_sleep(&mut state);
                None
            }
        });
        self.after_end(finished);
    }

    /// SERCOM interrupt body: run the handler of every raised and enabled
    /// flag
    pub fn handle_interrupt(&self) {
        if self.regs.pending_interrupts().contains(SercomInterrupts::MB) {
            self.handle_master_on_bus();
        }
        if self.regs.pending_interrupts().contains(SercomInterrupts::SB) {
            self.handle_slave_on_bus();
        }
        if self.regs.pending_interrupts().contains(SercomInterrupts::ERROR) {
            self.handle_error();
        }
    }
}
