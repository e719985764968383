// src/arch/x86_64/mod.rs

//! PC/AT platform: port I/O UARTs behind a chained 8259 pair.

pub mod cpu;
pub mod pic;
pub mod platform;

pub use cpu::{DEFAULT_TSC_CYCLES_PER_MICRO, TscClock, read_timestamp};
pub use pic::ChainedPics;
pub use platform::PcPlatform;
