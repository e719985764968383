// src/arch/mod.rs

//! Platform abstractions.
//!
//! Everything the serial link needs from the machine it runs on is reached
//! through the [`Platform`] trait and injected by the caller: register
//! access, the interrupt controller, the interrupt vector table, the port
//! lookup table and a clock.

pub mod sim;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

use crate::serial::backend::SerialHardware;
use crate::serial::config::PortId;
use crate::serial::timeout::Clock;
use crate::sync::InterruptController;

/// Code the platform runs when an IRQ line fires.
pub trait InterruptService: Sync {
    /// Service one interrupt. Runs with interrupts disabled.
    fn service(&self);
}

/// An installed interrupt vector
pub type IrqHandler = &'static dyn InterruptService;

/// Per-IRQ-line handler slots.
pub trait VectorTable {
    /// Install `handler` on `irq` and return whatever was installed before.
    fn swap_vector(&self, irq: u8, handler: Option<IrqHandler>) -> Option<IrqHandler>;
}

/// Where serial devices live.
pub trait PortTable {
    /// Base register address of `port`, or `None` if no device is fitted.
    fn base_address(&self, port: PortId) -> Option<u16>;
}

/// Everything a serial link needs from the machine.
pub trait Platform:
    SerialHardware + InterruptController + VectorTable + PortTable + Clock + Sync
{
}

impl<T> Platform for T where
    T: SerialHardware + InterruptController + VectorTable + PortTable + Clock + Sync + ?Sized
{
}
