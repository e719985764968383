// src/arch/x86_64/pic.rs

//! Programmable Interrupt Controller (8259 PIC)
//!
//! Standard master/slave pair. IRQ lines 0-7 live on the master, 8-15 on
//! the slave, which cascades through master line 2.

use x86_64::instructions::port::{Port, PortWriteOnly};

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// Initialization command (ICW1)
const ICW1_INIT: u8 = 0x11;
/// 8086/88 mode (ICW4)
const ICW4_8086: u8 = 0x01;
/// Non-specific End of Interrupt
const PIC_EOI: u8 = 0x20;
/// Master line the slave is wired to
const CASCADE_LINE: u8 = 2;

struct Pic {
    offset: u8,
    command: PortWriteOnly<u8>,
    data: Port<u8>,
}

impl Pic {
    unsafe fn end_of_interrupt(&mut self) {
        // SAFETY: caller acknowledges an interrupt this PIC raised
        unsafe { self.command.write(PIC_EOI) }
    }

    unsafe fn mask(&mut self) -> u8 {
        // SAFETY: reading OCW1 has no side effects
        unsafe { self.data.read() }
    }

    unsafe fn set_mask(&mut self, mask: u8) {
        // SAFETY: caller owns the interrupt mask
        unsafe { self.data.write(mask) }
    }
}

/// Chained PICs addressed by IRQ line
pub struct ChainedPics {
    pics: [Pic; 2],
}

impl ChainedPics {
    /// Vector offsets the kernel remapped the two PICs to
    #[must_use]
    pub const fn new(offset1: u8, offset2: u8) -> Self {
        Self {
            pics: [
                Pic {
                    offset: offset1,
                    command: PortWriteOnly::new(PIC1_COMMAND),
                    data: Port::new(PIC1_DATA),
                },
                Pic {
                    offset: offset2,
                    command: PortWriteOnly::new(PIC2_COMMAND),
                    data: Port::new(PIC2_DATA),
                },
            ],
        }
    }

    /// Remap both PICs to their offsets and mask every line but the cascade.
    ///
    /// # Safety
    ///
    /// Must run once, with interrupts disabled, before any other PIC access.
    pub unsafe fn initialize(&mut self) {
        let mut wait_port: PortWriteOnly<u8> = PortWriteOnly::new(0x80);
        let offsets = [self.pics[0].offset, self.pics[1].offset];
        // SAFETY: caller guarantees exclusive access to both PICs
        unsafe {
            let mut wait = || wait_port.write(0);

            // ICW1: start initialization
            self.pics[0].command.write(ICW1_INIT);
            wait();
            self.pics[1].command.write(ICW1_INIT);
            wait();

            // ICW2: vector offsets
            self.pics[0].data.write(offsets[0]);
            wait();
            self.pics[1].data.write(offsets[1]);
            wait();

            // ICW3: master gets a line bitmap, slave its cascade id
            self.pics[0].data.write(1 << CASCADE_LINE);
            wait();
            self.pics[1].data.write(CASCADE_LINE);
            wait();

            // ICW4: 8086 mode
            self.pics[0].data.write(ICW4_8086);
            wait();
            self.pics[1].data.write(ICW4_8086);
            wait();

            // Everything masked but the cascade
            self.pics[0].set_mask(!(1 << CASCADE_LINE));
            self.pics[1].set_mask(0xFF);
        }
    }

    /// Vector number `irq` is delivered on
    pub const fn vector(&self, irq: u8) -> u8 {
        if irq < 8 {
            self.pics[0].offset + irq
        } else {
            self.pics[1].offset + (irq - 8)
        }
    }

    fn line(irq: u8) -> (usize, u8) {
        if irq < 8 { (0, irq) } else { (1, irq - 8) }
    }

    /// # Safety
    ///
    /// The PICs must have been initialized.
    pub unsafe fn mask(&mut self, irq: u8) {
        let (pic, bit) = Self::line(irq);
        // SAFETY: caller guarantees the PICs are initialized
        unsafe {
            let value = self.pics[pic].mask();
            self.pics[pic].set_mask(value | (1 << bit));
        }
    }

    /// # Safety
    ///
    /// The PICs must have been initialized and a handler installed for `irq`.
    pub unsafe fn unmask(&mut self, irq: u8) {
        let (pic, bit) = Self::line(irq);
        // SAFETY: caller guarantees the PICs are initialized
        unsafe {
            let value = self.pics[pic].mask();
            self.pics[pic].set_mask(value & !(1 << bit));
        }
    }

    pub fn is_masked(&mut self, irq: u8) -> bool {
        let (pic, bit) = Self::line(irq);
        // SAFETY: reading the mask register has no side effects
        unsafe { self.pics[pic].mask() & (1 << bit) != 0 }
    }

    /// Acknowledge `irq`. Slave lines need an EOI on both PICs.
    ///
    /// # Safety
    ///
    /// Must be called from the handler servicing `irq`.
    pub unsafe fn notify_end_of_interrupt(&mut self, irq: u8) {
        // SAFETY: caller is servicing `irq`
        unsafe {
            if irq >= 8 {
                self.pics[1].end_of_interrupt();
            }
            self.pics[0].end_of_interrupt();
        }
    }
}
