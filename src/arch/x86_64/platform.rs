// src/arch/x86_64/platform.rs

//! PC platform
//!
//! UART registers through port I/O, the legacy 8259 pair for masking and
//! acknowledgement, and a TSC clock. The kernel owns the IDT; its stubs for
//! the PIC vectors forward to [`PcPlatform::dispatch`]:
//!
//! ```ignore
//! static PLATFORM: PcPlatform = PcPlatform::new(DEFAULT_TSC_CYCLES_PER_MICRO);
//!
//! extern "x86-interrupt" fn com1_interrupt(_frame: InterruptStackFrame) {
//!     PLATFORM.dispatch(COM1_IRQ);
//! }
//!
//! idt[PLATFORM.vector(COM1_IRQ) as usize].set_handler_fn(com1_interrupt);
//! ```

use super::cpu::TscClock;
use super::pic::ChainedPics;
use crate::arch::{InterruptService, IrqHandler, PortTable, VectorTable};
use crate::serial::backend::{Register, SerialHardware};
use crate::serial::config::PortId;
use crate::serial::constants::{SCRATCH_TEST_PRIMARY, SCRATCH_TEST_SECONDARY};
use crate::serial::timeout::Clock;
use crate::sync::InterruptController;
use core::time::Duration;
use spin::Mutex;
use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

const IRQ_LINES: usize = 16;
const PIC1_OFFSET: u8 = 0x20;
const PIC2_OFFSET: u8 = 0x28;

/// The PC/AT machine the link runs on
pub struct PcPlatform {
    pics: Mutex<ChainedPics>,
    vectors: Mutex<[Option<IrqHandler>; IRQ_LINES]>,
    clock: TscClock,
}

impl PcPlatform {
    /// PICs remapped to vectors 0x20 and 0x28
    pub const fn new(cycles_per_micro: u64) -> Self {
        Self::with_offsets(PIC1_OFFSET, PIC2_OFFSET, cycles_per_micro)
    }

    pub const fn with_offsets(offset1: u8, offset2: u8, cycles_per_micro: u64) -> Self {
        Self {
            pics: Mutex::new(ChainedPics::new(offset1, offset2)),
            vectors: Mutex::new([None; IRQ_LINES]),
            clock: TscClock::new(cycles_per_micro),
        }
    }

    /// Remap the PICs, leaving every device line masked.
    ///
    /// # Safety
    ///
    /// Must run once, before interrupts are enabled, and only if nothing
    /// else has programmed the PICs.
    pub unsafe fn initialize_pics(&self) {
        interrupts::without_interrupts(|| {
            // SAFETY: forwarded from the caller
            unsafe { self.pics.lock().initialize() }
        });
    }

    /// CPU vector `irq` arrives on
    pub fn vector(&self, irq: u8) -> u8 {
        interrupts::without_interrupts(|| self.pics.lock().vector(irq))
    }

    /// Run the handler installed on `irq`. Call from the IDT stub.
    ///
    /// With no handler installed the interrupt is acknowledged and dropped.
    pub fn dispatch(&self, irq: u8) {
        let handler = self.vectors.lock().get(usize::from(irq)).copied().flatten();
        match handler {
            Some(handler) => handler.service(),
            None => self.end_of_interrupt(irq),
        }
    }

    fn port(base: u16, register: Register) -> Port<u8> {
        Port::new(base + register.offset())
    }
}

impl SerialHardware for PcPlatform {
    #[inline]
    fn write(&self, base: u16, register: Register, value: u8) {
        let mut port = Self::port(base, register);
        // SAFETY: `base` came from `base_address`, which found a UART there
        unsafe { port.write(value) }
    }

    #[inline]
    fn read(&self, base: u16, register: Register) -> u8 {
        let mut port = Self::port(base, register);
        // SAFETY: as in `write`
        unsafe { port.read() }
    }
}

impl InterruptController for PcPlatform {
    fn disable_interrupts(&self) -> bool {
        let was_enabled = interrupts::are_enabled();
        interrupts::disable();
        was_enabled
    }

    fn restore_interrupts(&self, was_enabled: bool) {
        if was_enabled {
            interrupts::enable();
        }
    }

    fn mask_irq(&self, irq: u8) {
        interrupts::without_interrupts(|| {
            // SAFETY: the kernel initialized the PICs before any link opened
            unsafe { self.pics.lock().mask(irq) }
        });
    }

    fn unmask_irq(&self, irq: u8) {
        interrupts::without_interrupts(|| {
            // SAFETY: as in `mask_irq`; the handler is installed first
            unsafe { self.pics.lock().unmask(irq) }
        });
    }

    fn end_of_interrupt(&self, irq: u8) {
        // SAFETY: only called while servicing `irq`
        unsafe { self.pics.lock().notify_end_of_interrupt(irq) }
    }
}

impl VectorTable for PcPlatform {
    fn swap_vector(&self, irq: u8, handler: Option<IrqHandler>) -> Option<IrqHandler> {
        interrupts::without_interrupts(|| {
            let mut vectors = self.vectors.lock();
            vectors
                .get_mut(usize::from(irq))
                .and_then(|slot| core::mem::replace(slot, handler))
        })
    }
}

impl PortTable for PcPlatform {
    /// Standard address of `port`, if a UART answers there.
    ///
    /// Probes the scratch register and puts its contents back.
    fn base_address(&self, port: PortId) -> Option<u16> {
        let base = port.standard_base();
        let present = interrupts::without_interrupts(|| {
            let saved = self.read(base, Register::Scratch);
            let present = [SCRATCH_TEST_PRIMARY, SCRATCH_TEST_SECONDARY]
                .into_iter()
                .all(|pattern| {
                    self.write(base, Register::Scratch, pattern);
                    self.read(base, Register::Scratch) == pattern
                });
            self.write(base, Register::Scratch, saved);
            present
        });

        if present {
            Some(base)
        } else {
            log::debug!("serial: no UART at {:#x} for {:?}", base, port);
            None
        }
    }
}

impl Clock for PcPlatform {
    fn now(&self) -> Duration {
        self.clock.now()
    }
}
