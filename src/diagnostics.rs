// src/diagnostics.rs

//! Per-link counters
//!
//! The receive handler cannot log, so it records what happened here with
//! relaxed atomic increments; the foreground reads a [`LinkSnapshot`].

use core::sync::atomic::{AtomicU64, Ordering};

/// Counters for one serial link
#[derive(Debug)]
pub struct LinkStats {
    // Receive side, written by the interrupt handler
    bytes_received: AtomicU64,
    bytes_dropped: AtomicU64,
    foreign_interrupts: AtomicU64,

    // Transmit side, written by the foreground
    bytes_sent: AtomicU64,
    transmit_timeouts: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    /// Bytes stored in the receive ring
    pub bytes_received: u64,
    /// Bytes read from the UART and discarded because the ring was full
    pub bytes_dropped: u64,
    /// Interrupts whose identification was not receive-data-ready
    pub foreign_interrupts: u64,
    /// Bytes written to the transmit register
    pub bytes_sent: u64,
    /// Sends abandoned on timeout
    pub transmit_timeouts: u64,
}

impl LinkStats {
    pub const fn new() -> Self {
        Self {
            bytes_received: AtomicU64::new(0),
            bytes_dropped: AtomicU64::new(0),
            foreign_interrupts: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            transmit_timeouts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_received(&self) {
        self.bytes_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.bytes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_foreign_interrupt(&self) {
        self.foreign_interrupts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sent(&self) {
        self.bytes_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transmit_timeout(&self) {
        self.transmit_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
            foreign_interrupts: self.foreign_interrupts.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            transmit_timeouts: self.transmit_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let stats = LinkStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_dropped();
        stats.record_sent();
        stats.record_transmit_timeout();

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_received, 2);
        assert_eq!(snap.bytes_dropped, 1);
        assert_eq!(snap.foreign_interrupts, 0);
        assert_eq!(snap.bytes_sent, 1);
        assert_eq!(snap.transmit_timeouts, 1);
    }
}
