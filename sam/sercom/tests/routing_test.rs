//! Interrupt routing for I2C instances and instance numbering

use std::sync::Mutex;

use sam_sercom::{
    calc_i2c_baud, I2cMode, SercomHandler, SercomHandlers, SercomInstance, SercomInterrupts,
};

static CALLS: Mutex<Vec<(&'static str, usize)>> = Mutex::new(Vec::new());

fn mb(ctx: usize) {
    CALLS.lock().unwrap().push(("mb", ctx));
}

fn sb(ctx: usize) {
    CALLS.lock().unwrap().push(("sb", ctx));
}

fn error(ctx: usize) {
    CALLS.lock().unwrap().push(("error", ctx));
}

#[test]
fn test_i2c_flags_reach_their_handlers_in_order() {
    let handlers: SercomHandlers = SercomHandlers::new();
    handlers.register(4, SercomHandler::i2c(mb, sb, error, 0x44)).unwrap();

    handlers.dispatch(4, SercomInterrupts::ERROR | SercomInterrupts::MB);
    handlers.dispatch(4, SercomInterrupts::SB);
    // no RXC route in I2C mode
    handlers.dispatch(4, SercomInterrupts::RXC);

    // a later registration replaces the earlier one
    handlers.register(4, SercomHandler::i2c(mb, sb, error, 0x45)).unwrap();
    handlers.dispatch(4, SercomInterrupts::ERROR);

    assert_eq!(
        *CALLS.lock().unwrap(),
        vec![("mb", 0x44), ("error", 0x44), ("sb", 0x44), ("error", 0x45)]
    );
}

#[test]
fn test_trigger_pairs_are_distinct_per_instance() {
    let mut triggers: Vec<u8> = (0..6)
        .filter_map(SercomInstance::new)
        .flat_map(|s| [s.dma_rx_trigger(), s.dma_tx_trigger()])
        .collect();
    assert_eq!(triggers.len(), 12);
    triggers.dedup();
    assert_eq!(triggers, (0x01..=0x0C).collect::<Vec<u8>>());
}

#[test]
fn test_faster_modes_use_shorter_periods() {
    let clock = 48_000_000;
    let period = |mode| {
        let baud = calc_i2c_baud(mode, clock);
        baud.high as u32 + baud.low as u32
    };
    assert!(period(I2cMode::Fast) > period(I2cMode::FastPlus));
    assert!(period(I2cMode::FastPlus) > period(I2cMode::HighSpeed));
}
