#![forbid(unsafe_code)]

//! # SAM Simulator
//!
//! Host-side fakes of the register traits the drivers are written against.
//! Each fake records what the driver did to it and lets a test raise the
//! flags real hardware would raise, so driver state machines can be stepped
//! one interrupt at a time.
//!
//! The fakes use `Cell`/`RefCell` and are meant for single-threaded tests.

pub mod dmac;
pub mod i2c;
pub mod port;
pub mod spi;

pub use dmac::{FakeChannel, FakeDmac};
pub use i2c::FakeI2cSercom;
pub use port::{FakePort, PinEdge};
pub use spi::FakeSpiSercom;

/// DATA register address reported by the SERCOM fakes (SERCOM0 DATA)
pub const FAKE_DATA_REGISTER: u32 = 0x4200_0828;
