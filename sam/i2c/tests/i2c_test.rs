//! I2C driver tests against the simulated SERCOM and DMAC

use std::sync::Mutex;

use sam_core::{PeriphError, SleepGate};
use sam_dma::{DmaEvent, Dmac, DmacConfig};
use sam_i2c::{I2cBuffers, I2cCallback, I2cConfig, I2cMode, I2cState, SercomI2c};
use sam_sercom::{calc_i2c_baud, BusState, I2cCommand, I2cRegisters, I2cStatus, SercomInstance};
use sam_sim::{FakeDmac, FakeI2cSercom};

const DMA_CH: u8 = 3;

type I2c<'a, 'd, const N: usize = 12> =
    SercomI2c<'d, &'a FakeI2cSercom, &'a Dmac<'a, &'a FakeDmac>, N>;

fn dma_config() -> I2cConfig {
    I2cConfig::new().with_dma(SercomInstance::new(0).unwrap(), DMA_CH)
}

/// Run the SERCOM interrupt until nothing enabled is raised
fn pump<const N: usize>(sercom: &FakeI2cSercom, i2c: &I2c<'_, '_, N>) {
    for _ in 0..1000 {
        if sercom.pending_interrupts().is_empty() {
            return;
        }
        i2c.handle_interrupt();
    }
    panic!("SERCOM interrupt never settled");
}

/// Finish the DMA transfer on the driver's channel and route the completion
fn finish_dma(fake: &FakeDmac, dmac: &Dmac<'_, &FakeDmac>, i2c: &I2c<'_, '_>) {
    fake.complete(DMA_CH);
    dmac.service_pending(|event| {
        if let DmaEvent::Complete(ch) = event {
            i2c.handle_dma_complete(ch);
        }
    });
}

#[test]
fn test_init_forces_bus_idle() {
    let sercom = FakeI2cSercom::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let gate = SleepGate::new();
    let config = I2cConfig::new().with_mode(I2cMode::Fast);
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, config);

    assert_eq!(sercom.bus_state(), BusState::Unknown);
    i2c.init();

    assert_eq!(sercom.mode(), Some(I2cMode::Fast));
    assert_eq!(sercom.baud(), Some(calc_i2c_baud(I2cMode::Fast, 48_000_000)));
    assert!(sercom.is_enabled());
    assert_eq!(sercom.bus_state(), BusState::Idle);
    assert_eq!(sercom.irq_priority(), Some(1));
}

#[test]
fn test_dma_register_write_waits_for_bus_idle() {
    let data = [0x11, 0x22, 0x33, 0x44];
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x42);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    dmac.init();
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, dma_config());
    i2c.init();

    let id = i2c.start_reg_write(0x42, 0x10, &data).unwrap();
    // Register byte plus data counted by the hardware
    assert_eq!(sercom.addresses(), vec![(0x84, Some(5))]);
    assert_eq!(fake.channel(DMA_CH).trigger, 0x02);
    assert_eq!(dmac.descriptor(DMA_CH).unwrap().btcnt, 1);
    let second = dmac.linked_descriptor(DMA_CH).unwrap();
    assert_eq!(second.btcnt, 4);
    assert_eq!(second.source_start(), data.as_ptr() as usize as u32);
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::Tx));

    // Completion lands while the stop condition is still on the wire
    sercom.set_bus_state(BusState::Busy);
    finish_dma(&fake, &dmac, &i2c);
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::WaitForDone));
    assert!(!gate.sleep_allowed());

    for _ in 0..3 {
        assert!(!i2c.transaction_done(id));
    }
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::WaitForDone));
    assert!(!gate.sleep_allowed());

    sercom.set_bus_state(BusState::Idle);
    assert!(i2c.transaction_done(id));
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::Done));
    assert!(gate.sleep_allowed());
    assert!(sercom.enabled_interrupts().is_empty());
    // Smart mode with a length counter issues its own stop
    assert!(sercom.commands().is_empty());
}

#[test]
fn test_generic_dma_write_then_read_waits_for_rx() {
    let out = [0x01, 0x02, 0x03];
    let mut input = [0u8; 4];
    let in_addr = input.as_ptr() as usize as u32;

    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x42);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    dmac.init();
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, dma_config());
    i2c.init();

    let id = i2c.start_generic(0x42, &out, &mut input).unwrap();
    assert_eq!(sercom.addresses(), vec![(0x84, Some(3))]);
    assert_eq!(fake.channel(DMA_CH).trigger, 0x02);

    finish_dma(&fake, &dmac, &i2c);
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::WaitForRx));
    assert!(!gate.sleep_allowed());
    assert!(!i2c.transaction_done(id));
    assert_eq!(sercom.addresses().len(), 1);

    // The stop goes out, the read stage may start
    sercom.set_bus_state(BusState::Idle);
    assert!(!i2c.transaction_done(id));
    assert!(gate.sleep_allowed());
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::Rx));
    assert_eq!(sercom.addresses(), vec![(0x84, Some(3)), (0x85, Some(4))]);
    assert_eq!(fake.channel(DMA_CH).trigger, 0x01);
    let rx = dmac.descriptor(DMA_CH).unwrap();
    assert_eq!(rx.destination_start(), in_addr);
    assert_eq!(rx.btcnt, 4);
    assert!(!sercom.nack_armed());

    finish_dma(&fake, &dmac, &i2c);
    assert!(i2c.transaction_done(id));
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::Done));

    match i2c.clear_transaction(id).unwrap() {
        I2cBuffers::Generic { out, input } => {
            assert_eq!(out, &[0x01, 0x02, 0x03]);
            assert_eq!(input.len(), 4);
        }
        other => panic!("unexpected buffers {:?}", other),
    }
    assert_eq!(i2c.transaction_state(id), Err(PeriphError::NotFound));
}

#[test]
fn test_scan_finds_exactly_present_devices() {
    let sercom = FakeI2cSercom::new();
    for address in [0x10, 0x42, 0x68] {
        sercom.add_device(address);
    }
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, I2cConfig::new());
    i2c.init();

    let id = i2c.start_scan().unwrap();
    pump(&sercom, &i2c);
    assert!(i2c.transaction_done(id));
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::Done));

    for address in 0..128u8 {
        let expected = matches!(address, 0x10 | 0x42 | 0x68);
        assert_eq!(i2c.device_available(id, address), Ok(expected), "address {}", address);
    }
    assert_eq!(i2c.device_available(id, 200), Ok(false));
    assert_eq!(i2c.scan_results(id).unwrap().count_ones(), 3);

    let addresses = sercom.addresses();
    assert_eq!(addresses.len(), 127);
    assert_eq!(addresses.first(), Some(&(0x02, None)));
    assert_eq!(addresses.last(), Some(&(0xFE, None)));
    assert_eq!(sercom.commands(), vec![I2cCommand::Stop]);
    assert_eq!(sercom.bus_state(), BusState::Idle);
}

#[test]
fn test_interrupt_register_write() {
    let data = [0xAA, 0xBB];
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x1D);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, I2cConfig::new());
    i2c.init();

    let id = i2c.start_reg_write(0x1D, 0x20, &data).unwrap();
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::RegAddr));
    pump(&sercom, &i2c);

    assert!(i2c.transaction_done(id));
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::Done));
    assert_eq!(sercom.addresses(), vec![(0x3A, None)]);
    assert_eq!(sercom.written(), vec![0x20, 0xAA, 0xBB]);
    assert_eq!(sercom.commands(), vec![I2cCommand::Stop]);
    assert!(sercom.enabled_interrupts().is_empty());
}

#[test]
fn test_interrupt_register_read() {
    let mut data = [0u8; 3];
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x68);
    sercom.push_incoming(&[0x01, 0x02, 0x03]);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, I2cConfig::new());
    i2c.init();

    let id = i2c.start_reg_read(0x68, 0x3B, &mut data).unwrap();
    pump(&sercom, &i2c);

    assert_eq!(i2c.poll(id), Ok(()));
    assert_eq!(sercom.addresses(), vec![(0xD0, None), (0xD1, None)]);
    assert_eq!(sercom.written(), vec![0x3B]);
    assert_eq!(
        sercom.commands(),
        vec![I2cCommand::ReadByte, I2cCommand::ReadByte, I2cCommand::Stop]
    );
    // Last byte answered with a NACK
    assert!(sercom.nack_armed());
    match i2c.take_buffers(id).unwrap() {
        I2cBuffers::RegRead(data) => assert_eq!(data, &[0x01, 0x02, 0x03]),
        other => panic!("unexpected buffers {:?}", other),
    }
}

#[test]
fn test_short_stages_skip_dma() {
    let out = [0x75];
    let mut input = [0u8; 2];
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x42);
    sercom.push_incoming(&[0x5A, 0xA5]);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    dmac.init();
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, dma_config());
    i2c.init();

    let id = i2c.start_generic(0x42, &out, &mut input).unwrap();
    pump(&sercom, &i2c);

    assert!(i2c.transaction_done(id));
    assert_eq!(fake.channel(DMA_CH).starts, 0);
    assert_eq!(sercom.addresses(), vec![(0x84, None), (0x85, None)]);
    assert_eq!(sercom.written(), vec![0x75]);
    match i2c.take_buffers(id).unwrap() {
        I2cBuffers::Generic { input, .. } => assert_eq!(input, &[0x5A, 0xA5]),
        other => panic!("unexpected buffers {:?}", other),
    }
}

#[test]
fn test_missing_device_ends_with_slave_nack() {
    let mut data = [0u8; 1];
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x51);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, I2cConfig::new());
    i2c.init();

    let missing = i2c.start_reg_write(0x50, 0x00, &[0x01]).unwrap();
    pump(&sercom, &i2c);
    assert!(i2c.transaction_done(missing));
    assert_eq!(i2c.transaction_state(missing), Ok(I2cState::SlaveNack));
    assert!(sercom.written().is_empty());
    assert_eq!(sercom.bus_state(), BusState::Idle);

    // The bus is free for the next transaction
    let present = i2c.start_reg_read(0x51, 0x0F, &mut data).unwrap();
    pump(&sercom, &i2c);
    assert!(i2c.transaction_done(present));
    assert_eq!(i2c.transaction_state(present), Ok(I2cState::Done));
}

#[test]
fn test_error_interrupt_aborts_dma() {
    let first = [1, 2, 3, 4];
    let second = [5, 6, 7, 8];
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x42);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    dmac.init();
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, dma_config());
    i2c.init();

    let id = i2c.start_reg_write(0x42, 0x01, &first).unwrap();
    assert!(fake.channel(DMA_CH).enabled);
    sercom.raise_error(I2cStatus::ARBLOST);
    pump(&sercom, &i2c);

    assert!(!fake.channel(DMA_CH).enabled);
    assert!(i2c.transaction_done(id));
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::ArbitrationLost));
    assert!(sercom.enabled_interrupts().is_empty());

    // Another master finished with the bus
    sercom.set_bus_state(BusState::Idle);
    let id = i2c.start_reg_write(0x42, 0x02, &second).unwrap();
    sercom.raise_error(I2cStatus::LENERR);
    pump(&sercom, &i2c);
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::SlaveNack));
}

#[test]
fn test_busy_bus_defers_start() {
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x1D);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, I2cConfig::new());
    i2c.init();
    sercom.set_bus_state(BusState::Busy);

    let id = i2c.start_reg_write(0x1D, 0x20, &[0x01]).unwrap();
    assert!(!i2c.transaction_done(id));
    assert!(!i2c.transaction_done(id));
    assert_eq!(i2c.transaction_state(id), Ok(I2cState::Pending));
    assert!(sercom.addresses().is_empty());

    sercom.set_bus_state(BusState::Idle);
    assert_eq!(i2c.poll(id), Err(nb::Error::WouldBlock));
    assert_eq!(sercom.addresses(), vec![(0x3A, None)]);
    pump(&sercom, &i2c);
    assert!(i2c.transaction_done(id));
}

static CALLBACKS: Mutex<Vec<(I2cState, usize)>> = Mutex::new(Vec::new());

fn record(state: I2cState, context: usize) {
    CALLBACKS.lock().unwrap().push((state, context));
}

#[test]
fn test_callbacks_report_state_and_clear() {
    let mut data = [0u8; 2];
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x68);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, I2cConfig::new());
    i2c.init();

    let read = i2c
        .start_reg_read_with_cb(0x68, 0x75, &mut data, I2cCallback::new(record, 7))
        .unwrap();
    let write = i2c
        .start_reg_write_with_cb(0x33, 0x00, &[0xFF], I2cCallback::new(record, 9))
        .unwrap();
    pump(&sercom, &i2c);

    assert_eq!(
        *CALLBACKS.lock().unwrap(),
        vec![(I2cState::Done, 7), (I2cState::SlaveNack, 9)]
    );
    for id in [read, write] {
        assert_eq!(i2c.transaction_state(id), Err(PeriphError::NotFound));
        assert!(i2c.transaction_done(id));
    }
}

#[test]
fn test_request_validation_and_full_queue() {
    let mut empty: [u8; 0] = [];
    let mut a = [0u8; 1];
    let mut b = [0u8; 1];
    let mut c = [0u8; 1];
    let sercom = FakeI2cSercom::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_, 2> = SercomI2c::new(&sercom, &dmac, &gate, I2cConfig::new());
    i2c.init();
    sercom.set_bus_state(BusState::Busy);

    assert_eq!(i2c.start_generic(0x10, &[], &mut []), Err(PeriphError::InvalidState));
    assert_eq!(i2c.start_reg_read(0x10, 0x00, &mut empty), Err(PeriphError::InvalidState));
    assert_eq!(i2c.start_reg_write(0x80, 0x00, &[1]), Err(PeriphError::InvalidState));

    let first = i2c.start_reg_read(0x10, 0x00, &mut a).unwrap();
    i2c.start_reg_read(0x11, 0x00, &mut b).unwrap();
    assert_eq!(i2c.start_scan(), Err(PeriphError::QueueFull));

    assert!(matches!(i2c.clear_transaction(first), Ok(I2cBuffers::RegRead(_))));
    assert!(i2c.start_reg_read(0x12, 0x00, &mut c).is_ok());
    assert_eq!(i2c.scan_results(first), Err(PeriphError::NotFound));
}

#[test]
fn test_active_transaction_cannot_be_cleared() {
    let data = [0u8; 8];
    let sercom = FakeI2cSercom::new();
    sercom.add_device(0x42);
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    dmac.init();
    let gate = SleepGate::new();
    let i2c: I2c<'_, '_> = SercomI2c::new(&sercom, &dmac, &gate, dma_config());
    i2c.init();

    let id = i2c.start_reg_write(0x42, 0x00, &data).unwrap();
    assert_eq!(i2c.clear_transaction(id), Err(PeriphError::Busy));
    assert_eq!(i2c.take_buffers(id), Err(PeriphError::Busy));
    assert_eq!(i2c.scan_results(id), Err(PeriphError::InvalidState));
}
