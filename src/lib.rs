// src/lib.rs

//! Tiny Comm - interrupt-driven serial link for bare-metal x86
//!
//! A 16550-compatible UART driven from its receive interrupt. Received bytes
//! land in a lock-free single-producer/single-consumer ring that the
//! foreground polls; transmission is synchronous under CTS flow control with
//! deadline-bounded waits.
//!
//! Everything machine specific (register access, interrupt controller,
//! vector table, port lookup, clock) is injected through
//! [`arch::Platform`]. [`arch::x86_64::PcPlatform`] drives real hardware;
//! [`arch::sim::SimPlatform`] simulates it.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod arch;
pub mod diagnostics;
pub mod serial;
pub mod sync;

pub use arch::{InterruptService, IrqHandler, Platform, PortTable, VectorTable};
pub use diagnostics::{LinkSnapshot, LinkStats};
pub use serial::{
    Channel, Clock, ConfigError, LifecycleError, LifecycleState, LineSettings, Parity, PortConfig,
    PortId, Serial, SerialError, SerialHardware, TimeoutConfig, TransmitConfig, WaitStage,
    configure, divisor_for,
};
pub use sync::{CriticalSection, InterruptController, without_interrupts};
