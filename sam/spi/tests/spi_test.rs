//! SPI driver tests against the simulated SERCOM, DMAC and PORT

use std::sync::atomic::{AtomicUsize, Ordering};

use sam_core::PeriphError;
use sam_dma::{DmaChannelConfig, DmaEvent, Dmac, DmacConfig};
use sam_sercom::{SercomInstance, SercomInterrupts, SpiRegisters};
use sam_sim::{FakeDmac, FakePort, FakeSpiSercom, PinEdge, FAKE_DATA_REGISTER};
use sam_spi::{ChipSelect, SercomSpi, SpiCallback, SpiConfig, SpiPart};

const CS: ChipSelect = ChipSelect::new(0, 1 << 18);
const CS_OTHER: ChipSelect = ChipSelect::new(1, 1 << 3);
const TX_CH: u8 = 0;
const RX_CH: u8 = 1;
const BAUD: u32 = 1_000_000;

type Spi<'a, 'd, const N: usize = 16> =
    SercomSpi<'d, &'a FakeSpiSercom, &'a FakePort, &'a Dmac<'a, &'a FakeDmac>, N>;

fn dma_config() -> SpiConfig {
    SpiConfig::new().with_dma(SercomInstance::new(0).unwrap(), TX_CH, RX_CH)
}

/// Run the SERCOM interrupt until nothing enabled is raised
fn pump<const N: usize>(sercom: &FakeSpiSercom, spi: &Spi<'_, '_, N>) {
    for _ in 0..1000 {
        if sercom.pending_interrupts().is_empty() {
            return;
        }
        spi.handle_interrupt();
    }
    panic!("SERCOM interrupt never settled");
}

/// Finish the DMA transfer on `channel` and route the completion
fn finish_dma(fake: &FakeDmac, dmac: &Dmac<'_, &FakeDmac>, spi: &Spi<'_, '_>, channel: u8) {
    fake.complete(channel);
    dmac.service_pending(|event| {
        if let DmaEvent::Complete(ch) = event {
            spi.handle_dma_complete(ch);
        }
    });
}

fn edges_of(port: &FakePort, cs: ChipSelect) -> Vec<bool> {
    port.edges()
        .into_iter()
        .filter(|e: &PinEdge| e.group == cs.group && e.mask == cs.mask)
        .map(|e| e.high)
        .collect()
}

#[test]
fn test_init_configures_master() {
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();

    assert!(sercom.is_configured());
    assert_eq!(sercom.irq_priority(), Some(1));
    assert!(!sercom.is_enabled());
}

#[test]
fn test_simultaneous_dma_chains_cover_whole_transaction() {
    let out = [0x03, 0x00, 0x10];
    let mut input = [0u8; 5];
    let out_addr = out.as_ptr() as usize as u32;
    let in_addr = input.as_ptr() as usize as u32;

    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    dmac.init();
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, dma_config());
    spi.init();

    let id = spi.start(BAUD, CS, &out, &mut input).unwrap();
    assert!(sercom.receiver_enabled());
    assert!(port.is_low(CS.group, CS.mask));

    let tx = dmac.descriptor(TX_CH).unwrap();
    let tx_link = dmac.linked_descriptor(TX_CH).unwrap();
    assert_eq!(tx.next(), Some(dmac.link_address(TX_CH).unwrap()));
    assert_eq!(tx.btcnt + tx_link.btcnt, 8);
    assert_eq!(tx.source_start(), out_addr);
    assert_eq!(tx.destination_start(), FAKE_DATA_REGISTER);
    assert!(!tx_link.increments_source());
    assert_eq!(tx_link.btcnt, 5);

    let rx = dmac.descriptor(RX_CH).unwrap();
    let rx_link = dmac.linked_descriptor(RX_CH).unwrap();
    assert_eq!(rx.next(), Some(dmac.link_address(RX_CH).unwrap()));
    assert_eq!(rx.btcnt + rx_link.btcnt, 8);
    assert_eq!(rx.btcnt, 3);
    assert!(!rx.increments_destination());
    assert_eq!(rx_link.destination_start(), in_addr);
    assert!(rx_link.interrupts_on_block());

    assert_eq!((fake.channel(TX_CH).trigger, fake.channel(TX_CH).priority), (0x02, 1));
    assert_eq!((fake.channel(RX_CH).trigger, fake.channel(RX_CH).priority), (0x01, 2));

    // The padding TX transfer finishing first must not end the transaction
    finish_dma(&fake, &dmac, &spi, TX_CH);
    assert!(!spi.transaction_done(id));
    finish_dma(&fake, &dmac, &spi, RX_CH);
    assert!(spi.transaction_done(id));
    assert_eq!(edges_of(&port, CS), vec![false, true]);
    assert!(!sercom.is_enabled());
    assert!(!sercom.receiver_enabled());
    spi.clear_transaction(id).unwrap();
}

#[test]
fn test_tx_only_dma_ends_on_txc() {
    let out = [0xAA; 4];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let config = SpiConfig::new().with_tx_dma(dma_config().tx_dma.unwrap());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, config);
    spi.init();

    let id = spi.start(BAUD, CS, &out, &mut []).unwrap();
    let tx = dmac.descriptor(TX_CH).unwrap();
    assert_eq!(tx.btcnt, 4);
    assert_eq!(tx.next(), None);

    finish_dma(&fake, &dmac, &spi, TX_CH);
    assert!(!spi.transaction_done(id));
    sercom.clock_bytes(4);
    pump(&sercom, &spi);
    assert!(spi.transaction_done(id));
    assert_eq!(edges_of(&port, CS), vec![false, true]);
}

#[test]
fn test_tx_dma_with_interrupt_driven_reception() {
    let out = [0x9F];
    let mut input = [0u8; 3];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let config = SpiConfig::new().with_tx_dma(dma_config().tx_dma.unwrap());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, config);
    spi.init();

    let id = spi.start(BAUD, CS, &out, &mut input).unwrap();
    assert!(!sercom.receiver_enabled());
    let tx = dmac.descriptor(TX_CH).unwrap();
    assert_eq!(tx.btcnt, 1);
    assert!(tx.increments_source());

    // Out stage sent, then TXC hands over to reception
    finish_dma(&fake, &dmac, &spi, TX_CH);
    sercom.clock_bytes(1);
    pump(&sercom, &spi);
    assert!(sercom.receiver_enabled());
    assert!(sercom.enabled_interrupts().contains(SercomInterrupts::RXC));
    assert_eq!(fake.channel(TX_CH).starts, 2);
    let padding = dmac.descriptor(TX_CH).unwrap();
    assert_eq!(padding.btcnt, 3);
    assert!(!padding.increments_source());
    assert_eq!(padding.destination_start(), FAKE_DATA_REGISTER);

    // The padding transfer finishing is not the end of the transaction
    finish_dma(&fake, &dmac, &spi, TX_CH);
    assert!(!spi.transaction_done(id));

    sercom.push_miso(&[0xEF, 0x40, 0x18]);
    sercom.clock_bytes(3);
    pump(&sercom, &spi);
    assert!(spi.transaction_done(id));
    assert!(sercom.mosi().is_empty());
    let (_, received) = spi.clear_transaction(id).unwrap();
    assert_eq!(received, &[0xEF, 0x40, 0x18]);
    assert_eq!(edges_of(&port, CS), vec![false, true]);
    assert!(!sercom.receiver_enabled());
}

#[test]
fn test_interrupt_driven_write_then_read() {
    let out = [0x9F];
    let mut input = [0u8; 3];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();
    sercom.push_miso(&[0xEF, 0x40, 0x18]);

    let id = spi.start(BAUD, CS, &out, &mut input).unwrap();
    assert!(matches!(spi.poll(id), Err(nb::Error::WouldBlock)));
    pump(&sercom, &spi);

    assert!(spi.poll(id).is_ok());
    assert_eq!(sercom.mosi(), vec![0x9F, 0xFF, 0xFF, 0xFF]);
    assert_eq!(sercom.baud(), Some(23));
    let (_, received) = spi.clear_transaction(id).unwrap();
    assert_eq!(received, &[0xEF, 0x40, 0x18]);
    assert_eq!(edges_of(&port, CS), vec![false, true]);
    assert!(sercom.enabled_interrupts().is_empty());
}

#[test]
fn test_transactions_run_one_after_another() {
    let first = [1, 2, 3];
    let second = [4, 5];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();

    let a = spi.start(BAUD, CS, &first, &mut []).unwrap();
    let b = spi.start(BAUD, CS_OTHER, &second, &mut []).unwrap();
    assert_ne!(a, b);
    assert!(port.is_low(CS.group, CS.mask));
    assert!(!port.is_low(CS_OTHER.group, CS_OTHER.mask));

    pump(&sercom, &spi);
    assert!(spi.transaction_done(a));
    assert!(spi.transaction_done(b));
    assert_eq!(sercom.mosi(), vec![1, 2, 3, 4, 5]);
    assert_eq!(edges_of(&port, CS_OTHER), vec![false, true]);
    assert_eq!(sercom.enables(), 2);
}

#[test]
fn test_unachievable_baud_falls_back() {
    let out = [0x01];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let config = SpiConfig::new().with_core_frequency(8_000_000);
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, config);
    spi.init();

    let id = spi.start(10_000_000, CS, &out, &mut []).unwrap();
    assert_eq!(sercom.baud(), Some(3));
    pump(&sercom, &spi);
    assert!(spi.transaction_done(id));
}

#[test]
fn test_session_keeps_cs_asserted() {
    let command = [0x06];
    let read_cmd = [0x0B, 0x00];
    let mut data = [0u8; 2];
    let other = [0x55];

    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();
    sercom.push_miso(&[0xC0, 0xDE]);

    let session = spi.start_session(BAUD, CS).unwrap();
    assert!(!spi.session_active(session));
    assert!(edges_of(&port, CS).is_empty());

    spi.start_session_transaction(session, &command, &mut []).unwrap();
    pump(&sercom, &spi);
    assert!(spi.transaction_done(session));
    assert!(spi.session_active(session));
    assert_eq!(edges_of(&port, CS), vec![false]);

    // Unrelated work waits behind the session
    let queued = spi.start(BAUD, CS_OTHER, &other, &mut []).unwrap();
    pump(&sercom, &spi);
    assert!(!spi.transaction_done(queued));
    assert!(edges_of(&port, CS_OTHER).is_empty());

    spi.start_session_transaction(session, &read_cmd, &mut data)
        .unwrap();
    assert_eq!(
        spi.start_session_transaction(session, &[], &mut []),
        Err(PeriphError::SessionPending)
    );
    assert_eq!(spi.end_session(session), Err(PeriphError::Busy));
    pump(&sercom, &spi);
    assert!(spi.transaction_done(session));
    assert_eq!(edges_of(&port, CS), vec![false]);
    assert_eq!(spi.clear_transaction(session), Err(PeriphError::InvalidState));

    let (_, received) = spi.take_buffers(session).unwrap();
    assert_eq!(received, &[0xC0, 0xDE]);

    spi.end_session(session).unwrap();
    assert_eq!(edges_of(&port, CS), vec![false, true]);
    assert!(!spi.session_active(session));

    pump(&sercom, &spi);
    assert!(spi.transaction_done(queued));
    assert_eq!(edges_of(&port, CS_OTHER), vec![false, true]);
    assert_eq!(sercom.mosi(), vec![0x06, 0x0B, 0x00, 0xFF, 0xFF, 0x55]);
}

#[test]
fn test_session_errors() {
    let out = [0x01];
    let mut two = [0u8; 2];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();

    let plain = spi.start(BAUD, CS, &out, &mut []).unwrap();
    assert_eq!(
        spi.start_session_transaction(plain, &[], &mut []),
        Err(PeriphError::NotSession)
    );
    assert_eq!(
        spi.start_session_transaction(plain.wrapping_add(40), &[], &mut []),
        Err(PeriphError::NotFound)
    );
    let session = spi.start_session(BAUD, CS_OTHER).unwrap();
    assert_eq!(
        spi.start_simultaneous_session_transaction(session, &[1], &mut two),
        Err(PeriphError::InvalidState)
    );
    assert_eq!(spi.start(BAUD, CS, &[], &mut []), Err(PeriphError::InvalidState));
}

#[test]
fn test_simultaneous_session_transfer_uses_dma_for_both_directions() {
    let out = [0x80, 0x81, 0x82, 0x83];
    let mut input = [0u8; 4];
    let out_addr = out.as_ptr() as usize as u32;
    let in_addr = input.as_ptr() as usize as u32;

    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, dma_config());
    spi.init();

    let session = spi.start_session(BAUD, CS).unwrap();
    spi.start_simultaneous_session_transaction(session, &out, &mut input)
        .unwrap();
    // No out stage, so DRE hands straight over to reception
    pump(&sercom, &spi);

    let tx = dmac.descriptor(TX_CH).unwrap();
    assert_eq!(tx.source_start(), out_addr);
    assert_eq!(tx.btcnt, 4);
    assert!(tx.increments_source());
    let rx = dmac.descriptor(RX_CH).unwrap();
    assert_eq!(rx.destination_start(), in_addr);
    assert_eq!(rx.btcnt, 4);

    finish_dma(&fake, &dmac, &spi, TX_CH);
    assert!(!spi.transaction_done(session));
    finish_dma(&fake, &dmac, &spi, RX_CH);
    assert!(spi.transaction_done(session));
    assert_eq!(edges_of(&port, CS), vec![false]);

    spi.end_session(session).unwrap();
    assert_eq!(edges_of(&port, CS), vec![false, true]);
}

#[test]
fn test_multi_part_shares_one_cs_assertion() {
    let header = [0x02, 0x00, 0x00];
    let body = [0xDE, 0xAD];
    let mut status = [0u8; 1];

    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();
    sercom.push_miso(&[0x5A]);

    let ids = spi
        .start_multi_part(
            [
                SpiPart::new(BAUD, &header, &mut []),
                SpiPart::new(BAUD, &body, &mut status),
            ],
            CS,
        )
        .unwrap();
    assert_eq!(ids.len(), 2);

    pump(&sercom, &spi);
    assert!(ids.iter().all(|&id| spi.transaction_done(id)));
    assert_eq!(edges_of(&port, CS), vec![false, true]);
    assert_eq!(sercom.mosi(), vec![0x02, 0x00, 0x00, 0xDE, 0xAD, 0xFF]);
    let (_, status) = spi.clear_transaction(ids[1]).unwrap();
    assert_eq!(status, &[0x5A]);
}

#[test]
fn test_multi_part_blocks_other_chip_selects() {
    let a = [0x01];
    let b = [0x02];
    let c = [0x03];
    let header = [0xA0];
    let body = [0xB0];

    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_, 4> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();

    let first = spi.start(BAUD, CS_OTHER, &a, &mut []).unwrap();
    let dropped = spi.start(BAUD, CS_OTHER, &b, &mut []).unwrap();
    let last = spi.start(BAUD, CS_OTHER, &c, &mut []).unwrap();
    spi.clear_transaction(dropped).unwrap();
    // The freed slot sits before `last` in scan order, the second part after it
    let ids = spi
        .start_multi_part(
            [
                SpiPart::new(BAUD, &header, &mut []),
                SpiPart::new(BAUD, &body, &mut []),
            ],
            CS,
        )
        .unwrap();

    pump(&sercom, &spi);
    assert!(spi.transaction_done(first));
    assert!(spi.transaction_done(last));
    assert!(ids.iter().all(|&id| spi.transaction_done(id)));
    assert_eq!(sercom.mosi(), vec![0x01, 0xA0, 0xB0, 0x03]);

    let edges: Vec<(u8, bool)> = port.edges().into_iter().map(|e| (e.group, e.high)).collect();
    assert_eq!(
        edges,
        vec![
            (CS_OTHER.group, false),
            (CS_OTHER.group, true),
            (CS.group, false),
            (CS.group, true),
            (CS_OTHER.group, false),
            (CS_OTHER.group, true),
        ]
    );
}

#[test]
fn test_cleared_part_releases_chip_select() {
    let busy = [0x01];
    let header = [0xA0];
    let body = [0xB0];
    let after = [0x03];

    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();

    let first = spi.start(BAUD, CS_OTHER, &busy, &mut []).unwrap();
    let ids = spi
        .start_multi_part(
            [
                SpiPart::new(BAUD, &header, &mut []),
                SpiPart::new(BAUD, &body, &mut []),
            ],
            CS,
        )
        .unwrap();
    spi.clear_transaction(ids[1]).unwrap();
    let next = spi.start(BAUD, CS_OTHER, &after, &mut []).unwrap();

    pump(&sercom, &spi);
    assert!(spi.transaction_done(first));
    assert!(spi.transaction_done(ids[0]));
    assert!(spi.transaction_done(next));
    assert_eq!(sercom.mosi(), vec![0x01, 0xA0, 0x03]);
    assert_eq!(edges_of(&port, CS), vec![false, true]);
}

#[test]
fn test_full_queue_rejects_whole_multi_part() {
    let a = [1];
    let b = [2];
    let c = [3];
    let d = [4];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_, 2> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();

    let first = spi.start(BAUD, CS, &a, &mut []).unwrap();
    assert_eq!(
        spi.start_multi_part(
            [SpiPart::new(BAUD, &b, &mut []), SpiPart::new(BAUD, &c, &mut [])],
            CS_OTHER
        ),
        Err(PeriphError::QueueFull)
    );
    let second = spi.start(BAUD, CS, &d, &mut []).unwrap();
    assert_eq!(spi.start(BAUD, CS, &d, &mut []), Err(PeriphError::QueueFull));

    pump(&sercom, &spi);
    assert!(spi.transaction_done(first));
    assert!(spi.transaction_done(second));
    assert_eq!(sercom.mosi(), vec![1, 4]);
    spi.clear_transaction(first).unwrap();
    assert!(spi.start(BAUD, CS, &d, &mut []).is_ok());
}

#[test]
fn test_failed_dma_start_ends_transaction() {
    let out = [0x01, 0x02];
    let header = [0x03];
    let body = [0x04];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    // No such channel on the controller
    let config = SpiConfig::new().with_tx_dma(DmaChannelConfig::new(40, 0x02, 1));
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, config);
    spi.init();

    let id = spi.start(BAUD, CS, &out, &mut []).unwrap();
    assert!(spi.transaction_done(id));
    assert_eq!(edges_of(&port, CS), vec![false, true]);
    assert!(!sercom.is_enabled());
    assert!(sercom.enabled_interrupts().is_empty());
    spi.clear_transaction(id).unwrap();

    // The rest of a multi-part transfer is dropped along with the failed part
    let ids = spi
        .start_multi_part(
            [
                SpiPart::new(BAUD, &header, &mut []),
                SpiPart::new(BAUD, &body, &mut []),
            ],
            CS_OTHER,
        )
        .unwrap();
    assert!(ids.iter().all(|&id| spi.transaction_done(id)));
    assert_eq!(edges_of(&port, CS_OTHER), vec![false, true]);
    assert!(sercom.mosi().is_empty());
}

#[test]
fn test_failed_reception_dma_releases_bus() {
    let command = [0x9F];
    let mut id_bytes = [0u8; 2];
    let other = [0x55];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let config = SpiConfig::new().with_rx_dma(DmaChannelConfig::new(40, 0x01, 2));
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, config);
    spi.init();

    let read = spi.start(BAUD, CS, &command, &mut id_bytes).unwrap();
    let queued = spi.start(BAUD, CS_OTHER, &other, &mut []).unwrap();
    pump(&sercom, &spi);

    assert!(spi.transaction_done(read));
    assert_eq!(edges_of(&port, CS), vec![false, true]);
    assert!(spi.transaction_done(queued));
    assert_eq!(edges_of(&port, CS_OTHER), vec![false, true]);
    assert_eq!(sercom.mosi(), vec![0x9F, 0x55]);
    assert!(!sercom.receiver_enabled());
}

static CALLBACK_HITS: AtomicUsize = AtomicUsize::new(0);

fn on_done(context: usize) {
    CALLBACK_HITS.fetch_add(context, Ordering::SeqCst);
}

#[test]
fn test_callback_transaction_clears_itself() {
    let out = [0x42];
    let sercom = FakeSpiSercom::new();
    let port = FakePort::new();
    let fake = FakeDmac::new();
    let dmac = Dmac::new(&fake, DmacConfig::new());
    let spi: Spi<'_, '_> = SercomSpi::new(&sercom, &port, &dmac, SpiConfig::new());
    spi.init();

    let id = spi
        .start_with_cb(BAUD, CS, &out, &mut [], SpiCallback::new(on_done, 7))
        .unwrap();
    pump(&sercom, &spi);

    assert_eq!(CALLBACK_HITS.load(Ordering::SeqCst), 7);
    assert!(spi.transaction_done(id));
    assert_eq!(spi.clear_transaction(id), Err(PeriphError::NotFound));
}
