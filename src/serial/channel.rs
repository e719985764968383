// src/serial/channel.rs

//! Receive path
//!
//! A [`Channel`] is the `'static` storage behind one serial link: the receive
//! ring, the binding the interrupt handler works from, and the link counters.
//! Callers declare it as a `static` and pass it to [`Serial`](super::Serial);
//! the channel itself is what gets installed in the interrupt vector.
//!
//! # Locking
//!
//! The binding sits behind a spin lock. The foreground takes that lock only
//! inside a critical section (install and restore), so on the single CPU
//! this link runs on the handler never finds it held. Foreground queries
//! read an atomic flag instead of the lock.

use super::backend::Register;
use super::constants::{DEFAULT_RX_CAPACITY, IIR_ID_MASK, IIR_RX_DATA};
use super::ring::{Consumer, Producer, RxRing};
use crate::arch::{InterruptService, Platform};
use crate::diagnostics::LinkStats;
use crate::sync::CriticalSection;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

/// What the interrupt handler needs to service the port
pub(crate) struct Binding<P: 'static, const N: usize> {
    pub(crate) platform: &'static P,
    pub(crate) base: u16,
    pub(crate) irq: u8,
    pub(crate) producer: Producer<'static, N>,
}

/// Static storage for one serial link
pub struct Channel<P: 'static, const N: usize = DEFAULT_RX_CAPACITY> {
    ring: RxRing<N>,
    binding: Mutex<Option<Binding<P, N>>>,
    bound: AtomicBool,
    // Where the last binding acknowledged interrupts; outlives `unbind`
    route: Mutex<Option<(&'static P, u8)>>,
    stats: LinkStats,
}

impl<P: 'static, const N: usize> Channel<P, N> {
    pub const fn new() -> Self {
        Self {
            ring: RxRing::new(),
            binding: Mutex::new(None),
            bound: AtomicBool::new(false),
            route: Mutex::new(None),
            stats: LinkStats::new(),
        }
    }

    /// Link counters
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Whether an interrupt handler currently services this channel
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    pub(crate) fn split(&'static self) -> Option<(Producer<'static, N>, Consumer<'static, N>)> {
        self.ring.try_split()
    }

    /// Call with interrupts disabled.
    pub(crate) fn bind(&self, binding: Binding<P, N>) {
        *self.route.lock() = Some((binding.platform, binding.irq));
        *self.binding.lock() = Some(binding);
        self.bound.store(true, Ordering::Release);
    }

    /// Call with interrupts disabled.
    pub(crate) fn unbind(&self) -> Option<Binding<P, N>> {
        self.bound.store(false, Ordering::Release);
        self.binding.lock().take()
    }
}

impl<P: 'static, const N: usize> Default for Channel<P, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform + 'static, const N: usize> InterruptService for Channel<P, N> {
    fn service(&self) {
        let mut binding = self.binding.lock();
        let Some(binding) = binding.as_mut() else {
            // A late interrupt after restore still needs its EOI
            if let Some((platform, irq)) = *self.route.lock() {
                self.stats.record_foreign_interrupt();
                platform.end_of_interrupt(irq);
            }
            return;
        };
        let platform = binding.platform;
        let _cs = CriticalSection::enter(platform);

        let ident = platform.read(binding.base, Register::InterruptIdent);
        if ident & IIR_ID_MASK == IIR_RX_DATA {
            // Read even when full so the UART drops its data-ready request
            let byte = platform.read(binding.base, Register::Data);
            if binding.producer.push(byte) {
                self.stats.record_received();
            } else {
                self.stats.record_dropped();
            }
        } else {
            self.stats.record_foreign_interrupt();
        }

        platform.end_of_interrupt(binding.irq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimPlatform;
    use crate::serial::backend::SerialHardware;
    use crate::serial::constants::{COM1_BASE, COM1_IRQ, IER_RX_DATA, IIR_MODEM_STATUS};
    use crate::sync::InterruptController;

    fn bound_channel() -> (
        &'static SimPlatform,
        &'static Channel<SimPlatform, 4>,
        Consumer<'static, 4>,
    ) {
        let sim: &'static SimPlatform = Box::leak(Box::new(SimPlatform::new()));
        let channel: &'static Channel<SimPlatform, 4> = Box::leak(Box::new(Channel::new()));
        let (producer, consumer) = channel.split().unwrap();
        // Receive interrupt enabled at the UART; the line stays masked at the PIC
        sim.write(COM1_BASE, Register::InterruptEnable, IER_RX_DATA);
        channel.bind(Binding {
            platform: sim,
            base: COM1_BASE,
            irq: COM1_IRQ,
            producer,
        });
        (sim, channel, consumer)
    }

    #[test]
    fn test_service_stores_received_byte() {
        let (sim, channel, mut rx) = bound_channel();
        sim.deliver(0x41);

        channel.service();

        assert_eq!(rx.pop(), Some(0x41));
        assert_eq!(sim.eoi_count(), 1);
        assert_eq!(channel.stats().snapshot().bytes_received, 1);
        assert_eq!(sim.critical_depth(), 0);
    }

    #[test]
    fn test_service_drops_when_full() {
        let (sim, channel, mut rx) = bound_channel();
        for byte in 0..6 {
            sim.deliver(byte);
            channel.service();
        }

        assert!(rx.take_overflow());
        assert_eq!(channel.stats().snapshot().bytes_dropped, 2);
        // The UART was still read, so it is not left requesting service
        assert!(!sim.receiver_pending());
        assert_eq!(sim.eoi_count(), 6);
    }

    #[test]
    fn test_foreign_cause_acknowledged_not_consumed() {
        let (sim, channel, mut rx) = bound_channel();
        sim.force_interrupt_ident(IIR_MODEM_STATUS);

        channel.service();

        assert_eq!(rx.pop(), None);
        assert_eq!(sim.eoi_count(), 1);
        assert_eq!(channel.stats().snapshot().foreign_interrupts, 1);
    }

    #[test]
    fn test_never_bound_channel_ignores_interrupt() {
        let channel: Channel<SimPlatform, 4> = Channel::new();
        channel.service();
        assert!(!channel.is_bound());
        assert_eq!(channel.stats().snapshot().foreign_interrupts, 0);
    }

    #[test]
    fn test_late_interrupt_after_unbind_is_acknowledged() {
        let (sim, channel, mut rx) = bound_channel();
        let was_enabled = sim.disable_interrupts();
        let binding = channel.unbind();
        sim.restore_interrupts(was_enabled);
        assert!(binding.is_some());
        assert!(!channel.is_bound());

        sim.deliver(0x41);
        channel.service();

        assert_eq!(sim.eoi_count(), 1);
        assert_eq!(rx.pop(), None);
        assert_eq!(channel.stats().snapshot().foreign_interrupts, 1);
        // The byte is left for whoever owns the port next
        assert!(sim.receiver_pending());
    }

    #[test]
    fn test_is_bound_does_not_take_the_binding_lock() {
        let (_sim, channel, _rx) = bound_channel();
        let held = channel.binding.lock();
        assert!(channel.is_bound());
        drop(held);

        let binding = channel.unbind();
        assert!(binding.is_some());
        let held = channel.binding.lock();
        assert!(!channel.is_bound());
        drop(held);
    }
}
