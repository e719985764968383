// src/serial/constants.rs

//! Constants and register definitions for serial port operations

/// Register offsets from base port
pub mod register_offset {
    pub const DATA: u16 = 0;
    pub const INTERRUPT_ENABLE: u16 = 1;
    /// Interrupt identification on read, FIFO control on write
    pub const INTERRUPT_IDENT: u16 = 2;
    pub const LINE_CONTROL: u16 = 3;
    pub const MODEM_CONTROL: u16 = 4;
    pub const LINE_STATUS: u16 = 5;
    pub const MODEM_STATUS: u16 = 6;
    pub const SCRATCH: u16 = 7;
}

/// Standard base I/O address of COM1
pub const COM1_BASE: u16 = 0x3F8;
/// Standard base I/O address of COM2
pub const COM2_BASE: u16 = 0x2F8;
/// IRQ line wired to COM1
pub const COM1_IRQ: u8 = 4;
/// IRQ line wired to COM2
pub const COM2_IRQ: u8 = 3;

/// Crystal feeding the baud generator (1.8432 MHz)
pub const UART_CLOCK_HZ: u32 = 1_843_200;
/// Baud rate produced by a divisor of 1
pub const BAUD_BASE: u32 = UART_CLOCK_HZ / 16;

// FIFO control register
/// FIFO off: the receive interrupt hands over one byte at a time
pub const FCR_DISABLED: u8 = 0x00;

// Line control register
pub const LCR_DLAB: u8 = 0x80;
pub const LCR_TWO_STOP_BITS: u8 = 0x04;
pub const LCR_PARITY_NONE: u8 = 0x00;
pub const LCR_PARITY_ODD: u8 = 0x08;
pub const LCR_PARITY_EVEN: u8 = 0x18;
pub const LCR_PARITY_MASK: u8 = 0x38;

// Interrupt enable register
pub const IER_RX_DATA: u8 = 0x01;

// Interrupt identification register
pub const IIR_NO_PENDING: u8 = 0x01;
pub const IIR_ID_MASK: u8 = 0x07;
pub const IIR_RX_DATA: u8 = 0x04;
pub const IIR_MODEM_STATUS: u8 = 0x00;

// Modem control register
pub const MCR_DTR: u8 = 0x01;
pub const MCR_RTS: u8 = 0x02;
/// OUT2 gates the UART interrupt line onto the bus
pub const MCR_OUT2: u8 = 0x08;

// Line status register
pub const LSR_DATA_READY: u8 = 0x01;
pub const LSR_OVERRUN: u8 = 0x02;
pub const LSR_THR_EMPTY: u8 = 0x20;

// Modem status register
pub const MSR_CTS: u8 = 0x10;

/// Scratch patterns used by presence detection
pub const SCRATCH_TEST_PRIMARY: u8 = 0x55;
pub const SCRATCH_TEST_SECONDARY: u8 = 0xAA;

/// Default receive ring size (16 KiB)
pub const DEFAULT_RX_CAPACITY: usize = 0x4000;
