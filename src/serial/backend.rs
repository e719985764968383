// src/serial/backend.rs

//! Hardware abstraction for the serial driver.
//!
//! The goal of this module is to hide architecture- or platform-specific
//! register access details behind a lightweight trait so that the higher level
//! serial logic can be reused on targets that do not expose x86 style I/O
//! ports, and exercised against the simulated UART in `arch::sim`.

use super::constants::register_offset;

/// Registers that the UART driver interacts with.
///
/// Offsets 0 and 1 are aliased: with the DLAB bit set in the line control
/// register they address the divisor latch instead of the data and interrupt
/// enable registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Data,
    InterruptEnable,
    DivisorLatchLow,
    DivisorLatchHigh,
    InterruptIdent,
    FifoControl,
    LineControl,
    ModemControl,
    LineStatus,
    ModemStatus,
    Scratch,
}

impl Register {
    /// Offset of the register from the port's base address.
    pub const fn offset(self) -> u16 {
        match self {
            Register::Data | Register::DivisorLatchLow => register_offset::DATA,
            Register::InterruptEnable | Register::DivisorLatchHigh => {
                register_offset::INTERRUPT_ENABLE
            }
            Register::InterruptIdent | Register::FifoControl => register_offset::INTERRUPT_IDENT,
            Register::LineControl => register_offset::LINE_CONTROL,
            Register::ModemControl => register_offset::MODEM_CONTROL,
            Register::LineStatus => register_offset::LINE_STATUS,
            Register::ModemStatus => register_offset::MODEM_STATUS,
            Register::Scratch => register_offset::SCRATCH,
        }
    }
}

/// Minimal abstraction over UART register access.
///
/// Takes `&self` because the same registers are touched from the foreground
/// and from the receive interrupt handler; callers serialize conflicting
/// sequences with a critical section.
pub trait SerialHardware {
    /// Write a value to a UART register.
    fn write(&self, base: u16, register: Register, value: u8);
    /// Read the current value of a UART register.
    fn read(&self, base: u16, register: Register) -> u8;
}
