// src/arch/sim.rs

//! Simulated platform
//!
//! A software 16550 plus an 8259-style interrupt line, a vector table and a
//! stepping clock. Delivering a byte raises the receive interrupt exactly the
//! way the hardware would: only when the CPU flag is on, the line is
//! unmasked, OUT2 is set and the UART has the receive interrupt enabled.
//! The installed handler then runs synchronously on the caller's stack.
//!
//! Used by the test suite and usable on hosts without port I/O.

use super::{InterruptService, IrqHandler, PortTable, VectorTable};
use crate::serial::backend::{Register, SerialHardware};
use crate::serial::config::PortId;
use crate::serial::constants::{
    COM1_BASE, IER_RX_DATA, IIR_NO_PENDING, IIR_RX_DATA, LCR_DLAB, LSR_DATA_READY, LSR_OVERRUN,
    LSR_THR_EMPTY, MCR_OUT2, MSR_CTS, register_offset,
};
use crate::serial::timeout::Clock;
use crate::sync::InterruptController;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use spin::Mutex;

const IRQ_LINES: usize = 16;
const LSR_TX_IDLE: u8 = 0x40;
const DEFAULT_CLOCK_STEP_NANOS: u64 = 1_000;

/// Bytes kept by the transmit log
pub const TX_LOG_CAPACITY: usize = 256;

/// Bytes written to the transmit holding register, oldest first.
///
/// Keeps the first [`TX_LOG_CAPACITY`] bytes.
#[derive(Clone, Copy)]
pub struct TxLog {
    bytes: [u8; TX_LOG_CAPACITY],
    len: usize,
}

impl TxLog {
    const fn new() -> Self {
        Self {
            bytes: [0; TX_LOG_CAPACITY],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        if self.len < TX_LOG_CAPACITY {
            self.bytes[self.len] = byte;
            self.len += 1;
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for TxLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Register accesses kept by the access log
pub const ACCESS_LOG_CAPACITY: usize = 128;

/// One register access as the UART saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub register: Register,
    pub write: bool,
    /// Made inside a critical section
    pub guarded: bool,
}

/// Register accesses, oldest first. Keeps the first [`ACCESS_LOG_CAPACITY`].
#[derive(Debug, Clone, Copy)]
pub struct AccessLog {
    entries: [Option<Access>; ACCESS_LOG_CAPACITY],
    len: usize,
}

impl AccessLog {
    const fn new() -> Self {
        Self {
            entries: [None; ACCESS_LOG_CAPACITY],
            len: 0,
        }
    }

    fn record(&mut self, access: Access) {
        if self.len < ACCESS_LOG_CAPACITY {
            self.entries[self.len] = Some(access);
            self.len += 1;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Access> + '_ {
        self.entries[..self.len].iter().flatten().copied()
    }

    /// Writes to `register`
    pub fn writes_to(&self, register: Register) -> impl Iterator<Item = Access> + '_ {
        self.iter()
            .filter(move |access| access.write && access.register == register)
    }

    /// Reads of `register`
    pub fn reads_of(&self, register: Register) -> impl Iterator<Item = Access> + '_ {
        self.iter()
            .filter(move |access| !access.write && access.register == register)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

struct SimUart {
    rbr: u8,
    ier: u8,
    lcr: u8,
    mcr: u8,
    lsr: u8,
    msr: u8,
    scr: u8,
    fcr: u8,
    dll: u8,
    dlm: u8,
    rx_pending: bool,
    forced_ident: Option<u8>,
    tx: TxLog,
    accesses: AccessLog,
    writes: usize,
}

impl SimUart {
    const fn new() -> Self {
        Self {
            rbr: 0,
            ier: 0,
            lcr: 0,
            mcr: 0,
            lsr: LSR_THR_EMPTY | LSR_TX_IDLE,
            msr: MSR_CTS,
            scr: 0,
            fcr: 0,
            dll: 0,
            dlm: 0,
            rx_pending: false,
            forced_ident: None,
            tx: TxLog::new(),
            accesses: AccessLog::new(),
            writes: 0,
        }
    }

    fn dlab(&self) -> bool {
        self.lcr & LCR_DLAB != 0
    }

    fn pending_ident(&self) -> Option<u8> {
        if let Some(ident) = self.forced_ident {
            return Some(ident);
        }
        (self.rx_pending && self.ier & IER_RX_DATA != 0).then_some(IIR_RX_DATA)
    }

    /// Whether the UART drives its interrupt output onto the bus
    fn asserted(&self) -> bool {
        self.mcr & MCR_OUT2 != 0 && self.pending_ident().is_some()
    }

    fn read(&mut self, offset: u16) -> u8 {
        match offset {
            register_offset::DATA if self.dlab() => self.dll,
            register_offset::DATA => {
                self.rx_pending = false;
                self.lsr &= !LSR_DATA_READY;
                self.rbr
            }
            register_offset::INTERRUPT_ENABLE if self.dlab() => self.dlm,
            register_offset::INTERRUPT_ENABLE => self.ier,
            register_offset::INTERRUPT_IDENT => match self.forced_ident.take() {
                Some(ident) => ident,
                None => self.pending_ident().unwrap_or(IIR_NO_PENDING),
            },
            register_offset::LINE_CONTROL => self.lcr,
            register_offset::MODEM_CONTROL => self.mcr,
            register_offset::LINE_STATUS => {
                let lsr = self.lsr;
                self.lsr &= !LSR_OVERRUN;
                lsr
            }
            register_offset::MODEM_STATUS => self.msr,
            register_offset::SCRATCH => self.scr,
            _ => 0xFF,
        }
    }

    fn write(&mut self, offset: u16, value: u8) {
        self.writes += 1;
        match offset {
            register_offset::DATA if self.dlab() => self.dll = value,
            register_offset::DATA => self.tx.push(value),
            register_offset::INTERRUPT_ENABLE if self.dlab() => self.dlm = value,
            register_offset::INTERRUPT_ENABLE => self.ier = value & 0x0F,
            register_offset::INTERRUPT_IDENT => self.fcr = value,
            register_offset::LINE_CONTROL => self.lcr = value,
            register_offset::MODEM_CONTROL => self.mcr = value & 0x1F,
            register_offset::SCRATCH => self.scr = value,
            // Read-only status registers
            _ => {}
        }
    }
}

/// Simulated machine with one UART
pub struct SimPlatform {
    port: Option<PortId>,
    base: u16,
    uart: Mutex<SimUart>,
    cpu_interrupts: AtomicBool,
    critical_depth: AtomicUsize,
    max_critical_depth: AtomicUsize,
    irq_mask: AtomicU16,
    eoi_count: AtomicU32,
    vectors: Mutex<[Option<IrqHandler>; IRQ_LINES]>,
    clock_nanos: AtomicU64,
    clock_step_nanos: AtomicU64,
}

impl SimPlatform {
    /// A machine with a UART at the standard COM1 address
    pub const fn new() -> Self {
        Self::with_port(Some(PortId::Com1), COM1_BASE)
    }

    /// A machine with a UART at the standard address of `port`
    pub const fn on(port: PortId) -> Self {
        Self::with_port(Some(port), port.standard_base())
    }

    /// A machine with no serial port fitted
    pub const fn absent() -> Self {
        Self::with_port(None, 0)
    }

    const fn with_port(port: Option<PortId>, base: u16) -> Self {
        Self {
            port,
            base,
            uart: Mutex::new(SimUart::new()),
            cpu_interrupts: AtomicBool::new(true),
            critical_depth: AtomicUsize::new(0),
            max_critical_depth: AtomicUsize::new(0),
            irq_mask: AtomicU16::new(0xFFFF),
            eoi_count: AtomicU32::new(0),
            vectors: Mutex::new([None; IRQ_LINES]),
            clock_nanos: AtomicU64::new(0),
            clock_step_nanos: AtomicU64::new(DEFAULT_CLOCK_STEP_NANOS),
        }
    }

    fn irq(&self) -> Option<u8> {
        self.port.map(PortId::irq)
    }

    /// A byte arrives on the wire. Returns whether the handler ran.
    ///
    /// A byte arriving before the previous one was read overwrites it and
    /// sets the overrun bit.
    pub fn deliver(&self, byte: u8) -> bool {
        {
            let mut uart = self.uart.lock();
            if uart.rx_pending {
                uart.lsr |= LSR_OVERRUN;
            }
            uart.rbr = byte;
            uart.rx_pending = true;
            uart.lsr |= LSR_DATA_READY;
        }
        self.fire_if_asserted()
    }

    /// Deliver `bytes` one at a time. Returns how many were serviced.
    pub fn deliver_all(&self, bytes: &[u8]) -> usize {
        bytes.iter().filter(|&&byte| self.deliver(byte)).count()
    }

    /// Make the next identification read report `ident`, then raise the line.
    pub fn force_interrupt_ident(&self, ident: u8) -> bool {
        self.uart.lock().forced_ident = Some(ident);
        self.fire_if_asserted()
    }

    fn fire_if_asserted(&self) -> bool {
        let Some(irq) = self.irq() else {
            return false;
        };
        if !self.cpu_interrupts.load(Ordering::SeqCst) || self.is_masked(irq) {
            return false;
        }
        if !self.uart.lock().asserted() {
            return false;
        }
        let Some(handler) = self.vector(irq) else {
            return false;
        };

        // The CPU clears IF on entry and IRET restores it
        self.cpu_interrupts.store(false, Ordering::SeqCst);
        handler.service();
        self.cpu_interrupts.store(true, Ordering::SeqCst);
        true
    }

    /// Divisor latch contents
    pub fn divisor(&self) -> u16 {
        let uart = self.uart.lock();
        u16::from_le_bytes([uart.dll, uart.dlm])
    }

    pub fn line_control(&self) -> u8 {
        self.uart.lock().lcr
    }

    pub fn modem_control(&self) -> u8 {
        self.uart.lock().mcr
    }

    pub fn interrupt_enable(&self) -> u8 {
        self.uart.lock().ier
    }

    /// Last value written to the FIFO control register
    pub fn fifo_control(&self) -> u8 {
        self.uart.lock().fcr
    }

    /// Every register access so far, tagged with whether it was guarded
    pub fn accesses(&self) -> AccessLog {
        self.uart.lock().accesses
    }

    pub fn clear_accesses(&self) {
        self.uart.lock().accesses = AccessLog::new();
    }

    /// Line status without the read side effects
    pub fn line_status(&self) -> u8 {
        self.uart.lock().lsr
    }

    pub fn transmitted(&self) -> TxLog {
        self.uart.lock().tx
    }

    /// Register writes that reached the UART
    pub fn register_writes(&self) -> usize {
        self.uart.lock().writes
    }

    /// Whether a received byte is waiting in the receive buffer register
    pub fn receiver_pending(&self) -> bool {
        self.uart.lock().rx_pending
    }

    pub fn set_clear_to_send(&self, asserted: bool) {
        let mut uart = self.uart.lock();
        if asserted {
            uart.msr |= MSR_CTS;
        } else {
            uart.msr &= !MSR_CTS;
        }
    }

    pub fn set_transmitter_ready(&self, ready: bool) {
        let mut uart = self.uart.lock();
        if ready {
            uart.lsr |= LSR_THR_EMPTY;
        } else {
            uart.lsr &= !LSR_THR_EMPTY;
        }
    }

    pub fn eoi_count(&self) -> u32 {
        self.eoi_count.load(Ordering::SeqCst)
    }

    pub fn is_masked(&self, irq: u8) -> bool {
        self.irq_mask.load(Ordering::SeqCst) & (1 << irq) != 0
    }

    pub fn vector(&self, irq: u8) -> Option<IrqHandler> {
        self.vectors.lock().get(usize::from(irq)).copied().flatten()
    }

    /// CPU interrupt flag
    pub fn interrupts_enabled(&self) -> bool {
        self.cpu_interrupts.load(Ordering::SeqCst)
    }

    /// Currently open critical sections
    pub fn critical_depth(&self) -> usize {
        self.critical_depth.load(Ordering::SeqCst)
    }

    pub fn max_critical_depth(&self) -> usize {
        self.max_critical_depth.load(Ordering::SeqCst)
    }

    /// How far the clock moves on every reading
    pub fn set_clock_step(&self, step: Duration) {
        self.clock_step_nanos.store(step.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.clock_nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialHardware for SimPlatform {
    fn write(&self, base: u16, register: Register, value: u8) {
        if base != self.base || self.port.is_none() {
            return;
        }
        let guarded = self.critical_depth() > 0;
        {
            let mut uart = self.uart.lock();
            uart.accesses.record(Access {
                register,
                write: true,
                guarded,
            });
            uart.write(register.offset(), value);
        }
        // Enabling the source or OUT2 with a byte waiting raises the line
        if matches!(register, Register::InterruptEnable | Register::ModemControl) {
            self.fire_if_asserted();
        }
    }

    fn read(&self, base: u16, register: Register) -> u8 {
        if base != self.base || self.port.is_none() {
            return 0xFF;
        }
        let guarded = self.critical_depth() > 0;
        let mut uart = self.uart.lock();
        uart.accesses.record(Access {
            register,
            write: false,
            guarded,
        });
        uart.read(register.offset())
    }
}

impl InterruptController for SimPlatform {
    fn disable_interrupts(&self) -> bool {
        let depth = self.critical_depth.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_critical_depth.fetch_max(depth, Ordering::SeqCst);
        self.cpu_interrupts.swap(false, Ordering::SeqCst)
    }

    fn restore_interrupts(&self, was_enabled: bool) {
        self.critical_depth.fetch_sub(1, Ordering::SeqCst);
        if was_enabled {
            self.cpu_interrupts.store(true, Ordering::SeqCst);
            self.fire_if_asserted();
        }
    }

    fn mask_irq(&self, irq: u8) {
        self.irq_mask.fetch_or(1 << irq, Ordering::SeqCst);
    }

    fn unmask_irq(&self, irq: u8) {
        self.irq_mask.fetch_and(!(1 << irq), Ordering::SeqCst);
        self.fire_if_asserted();
    }

    fn end_of_interrupt(&self, _irq: u8) {
        self.eoi_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl VectorTable for SimPlatform {
    fn swap_vector(&self, irq: u8, handler: Option<IrqHandler>) -> Option<IrqHandler> {
        let mut vectors = self.vectors.lock();
        match vectors.get_mut(usize::from(irq)) {
            Some(slot) => core::mem::replace(slot, handler),
            None => None,
        }
    }
}

impl PortTable for SimPlatform {
    fn base_address(&self, port: PortId) -> Option<u16> {
        (self.port == Some(port)).then_some(self.base)
    }
}

impl Clock for SimPlatform {
    fn now(&self) -> Duration {
        let step = self.clock_step_nanos.load(Ordering::SeqCst);
        Duration::from_nanos(self.clock_nanos.fetch_add(step, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::constants::{COM1_IRQ, COM2_BASE, IIR_MODEM_STATUS};

    struct Counter(AtomicU32);

    impl InterruptService for Counter {
        fn service(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_divisor_latch_aliases_data_registers() {
        let sim = SimPlatform::new();
        sim.write(COM1_BASE, Register::LineControl, LCR_DLAB);
        sim.write(COM1_BASE, Register::DivisorLatchLow, 0x0C);
        sim.write(COM1_BASE, Register::DivisorLatchHigh, 0x00);
        sim.write(COM1_BASE, Register::LineControl, 0x03);
        sim.write(COM1_BASE, Register::Data, b'x');

        assert_eq!(sim.divisor(), 12);
        assert_eq!(sim.interrupt_enable(), 0);
        assert_eq!(sim.transmitted().as_slice(), b"x");
    }

    #[test]
    fn test_wrong_base_reads_floating_bus() {
        let sim = SimPlatform::new();
        sim.write(COM2_BASE, Register::Scratch, 0x55);
        assert_eq!(sim.read(COM2_BASE, Register::Scratch), 0xFF);
        assert_eq!(sim.register_writes(), 0);
        assert_eq!(SimPlatform::absent().base_address(PortId::Com1), None);
        assert_eq!(
            SimPlatform::on(PortId::Com2).base_address(PortId::Com2),
            Some(COM2_BASE)
        );
    }

    #[test]
    fn test_interrupt_requires_every_gate() {
        static COUNTER: Counter = Counter(AtomicU32::new(0));
        let sim = SimPlatform::new();
        sim.swap_vector(COM1_IRQ, Some(&COUNTER));

        // Masked at the controller, source disabled, OUT2 low
        assert!(!sim.deliver(1));
        sim.unmask_irq(COM1_IRQ);
        assert!(!sim.deliver(2));
        sim.write(COM1_BASE, Register::InterruptEnable, IER_RX_DATA);
        assert!(!sim.deliver(3));
        assert_ne!(sim.line_status() & LSR_OVERRUN, 0);

        // Raising OUT2 with a byte waiting fires immediately
        sim.write(COM1_BASE, Register::ModemControl, MCR_OUT2);
        assert_eq!(COUNTER.0.load(Ordering::SeqCst), 1);
        assert!(sim.interrupts_enabled());
    }

    #[test]
    fn test_forced_ident_is_read_once() {
        let sim = SimPlatform::new();
        sim.force_interrupt_ident(IIR_MODEM_STATUS);
        assert_eq!(
            sim.read(COM1_BASE, Register::InterruptIdent),
            IIR_MODEM_STATUS
        );
        assert_eq!(
            sim.read(COM1_BASE, Register::InterruptIdent),
            IIR_NO_PENDING
        );
    }

    #[test]
    fn test_access_log_tags_guarded_accesses() {
        let sim = SimPlatform::new();
        sim.write(COM1_BASE, Register::Scratch, 1);
        let was_enabled = sim.disable_interrupts();
        sim.write(COM1_BASE, Register::FifoControl, 0xC7);
        sim.read(COM1_BASE, Register::LineStatus);
        sim.restore_interrupts(was_enabled);

        let log = sim.accesses();
        assert_eq!(log.len(), 3);
        assert!(log.writes_to(Register::Scratch).all(|a| !a.guarded));
        assert!(log.writes_to(Register::FifoControl).all(|a| a.guarded));
        assert!(log.reads_of(Register::LineStatus).all(|a| a.guarded));
        assert_eq!(sim.fifo_control(), 0xC7);

        sim.clear_accesses();
        assert!(sim.accesses().is_empty());
    }

    #[test]
    fn test_clock_steps_on_every_reading() {
        let sim = SimPlatform::new();
        sim.set_clock_step(Duration::from_micros(10));
        let first = sim.now();
        let second = sim.now();
        assert_eq!(second - first, Duration::from_micros(10));
        sim.advance(Duration::from_millis(1));
        assert!(sim.now() - second >= Duration::from_millis(1));
    }
}
