// src/serial/ring.rs

//! Bounded single-producer/single-consumer byte queue
//!
//! The classic lock-free ring: the producer (receive interrupt handler) is the
//! only writer of `head`, the consumer (foreground) the only writer of `tail`.
//! Each side publishes its index with `Release` after touching the slot and
//! reads the other side's index with `Acquire`, so a slot is never read before
//! its byte is written nor overwritten before it has been read.
//!
//! Indices are free-running counters masked with `N - 1` on access, which
//! lets the ring hold exactly `N` bytes: it is empty when `head == tail` and
//! full when `head - tail == N`. A byte arriving while full is dropped and the
//! sticky overflow flag is set; stored data is never overwritten.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Ring storage. Capacity `N` must be a power of two.
pub struct RxRing<const N: usize> {
    buf: UnsafeCell<[u8; N]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    overflow: AtomicBool,
    producer_taken: AtomicBool,
    consumer_taken: AtomicBool,
}

// SAFETY: slots are only written through the unique `Producer` and only read
// through the unique `Consumer`; the head/tail protocol keeps them on
// disjoint slots.
unsafe impl<const N: usize> Sync for RxRing<N> {}

impl<const N: usize> RxRing<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        N - 1
    };

    /// Number of bytes the ring can hold
    pub const CAPACITY: usize = N;

    pub const fn new() -> Self {
        let _ = Self::MASK;
        Self {
            buf: UnsafeCell::new([0; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            overflow: AtomicBool::new(false),
            producer_taken: AtomicBool::new(false),
            consumer_taken: AtomicBool::new(false),
        }
    }

    /// Hand out the producer and consumer halves.
    ///
    /// Returns `None` while either half from an earlier split is still alive.
    pub fn try_split(&self) -> Option<(Producer<'_, N>, Consumer<'_, N>)> {
        if self
            .producer_taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        if self
            .consumer_taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.producer_taken.store(false, Ordering::Release);
            return None;
        }
        Some((Producer { ring: self }, Consumer { ring: self }))
    }

    /// Bytes currently stored
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, index: usize) -> *mut u8 {
        // SAFETY: masking keeps the offset inside the array.
        unsafe { self.buf.get().cast::<u8>().add(index & Self::MASK) }
    }
}

impl<const N: usize> Default for RxRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Write half, owned by the receive interrupt handler
pub struct Producer<'a, const N: usize> {
    ring: &'a RxRing<N>,
}

impl<const N: usize> Producer<'_, N> {
    /// Store a byte. Returns false, and sets the overflow flag, when full.
    pub fn push(&mut self, byte: u8) -> bool {
        let ring = self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= N {
            ring.overflow.store(true, Ordering::Release);
            return false;
        }

        // SAFETY: the slot at `head` is outside [tail, head) so the consumer
        // is not reading it, and we are the only producer.
        unsafe { ring.slot(head).write(byte) };
        ring.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }
}

impl<const N: usize> Drop for Producer<'_, N> {
    fn drop(&mut self) {
        self.ring.producer_taken.store(false, Ordering::Release);
    }
}

/// Read half, owned by the foreground
pub struct Consumer<'a, const N: usize> {
    ring: &'a RxRing<N>,
}

impl<const N: usize> Consumer<'_, N> {
    /// Take the oldest byte, never blocking.
    pub fn pop(&mut self) -> Option<u8> {
        let ring = self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // SAFETY: `tail` is inside [tail, head), published by the producer
        // with Release and observed above with Acquire.
        let byte = unsafe { ring.slot(tail).read() };
        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(byte)
    }

    /// Read and clear the sticky overflow flag.
    pub fn take_overflow(&mut self) -> bool {
        self.ring.overflow.swap(false, Ordering::AcqRel)
    }

    /// Discard everything buffered and clear the overflow flag.
    ///
    /// Only `tail` moves, so this is safe while the producer is live.
    pub fn reset(&mut self) {
        let head = self.ring.head.load(Ordering::Acquire);
        self.ring.tail.store(head, Ordering::Release);
        self.ring.overflow.store(false, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<const N: usize> Drop for Consumer<'_, N> {
    fn drop(&mut self) {
        self.ring.consumer_taken.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let ring = RxRing::<8>::new();
        let (mut tx, mut rx) = ring.try_split().unwrap();
        for byte in [1, 2, 3] {
            assert!(tx.push(byte));
        }
        assert_eq!(rx.pop(), Some(1));
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
        assert_eq!(rx.pop(), None);
        assert!(!rx.take_overflow());
    }

    #[test]
    fn test_full_ring_drops_and_flags() {
        let ring = RxRing::<4>::new();
        let (mut tx, mut rx) = ring.try_split().unwrap();
        let stored = (0..6u8).filter(|&b| tx.push(b)).count();
        assert_eq!(stored, 4);
        assert_eq!(rx.len(), 4);

        assert!(rx.take_overflow());
        assert!(!rx.take_overflow());
        assert_eq!(
            core::iter::from_fn(|| rx.pop()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let ring = RxRing::<4>::new();
        let (mut tx, mut rx) = ring.try_split().unwrap();
        for round in 0..10u8 {
            assert!(tx.push(round));
            assert!(tx.push(round.wrapping_mul(3)));
            assert_eq!(rx.pop(), Some(round));
            assert_eq!(rx.pop(), Some(round.wrapping_mul(3)));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn test_reset_discards_without_touching_head() {
        let ring = RxRing::<4>::new();
        let (mut tx, mut rx) = ring.try_split().unwrap();
        for byte in 0..5 {
            tx.push(byte);
        }
        rx.reset();
        assert!(rx.is_empty());
        assert!(!rx.take_overflow());
        assert!(tx.push(9));
        assert_eq!(rx.pop(), Some(9));
    }

    #[test]
    fn test_split_is_exclusive_until_dropped() {
        let ring = RxRing::<4>::new();
        let halves = ring.try_split();
        assert!(halves.is_some());
        assert!(ring.try_split().is_none());
        drop(halves);
        assert!(ring.try_split().is_some());
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        const COUNT: usize = 100_000;
        let ring: &'static RxRing<64> = Box::leak(Box::new(RxRing::new()));
        let (mut tx, mut rx) = ring.try_split().unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut next = 0usize;
                while next < COUNT {
                    if tx.push(next as u8) {
                        next += 1;
                    } else {
                        thread::yield_now();
                    }
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut expected = 0usize;
        while expected < COUNT {
            match rx.pop() {
                Some(byte) => {
                    assert_eq!(byte, expected as u8);
                    expected += 1;
                }
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert!(done.load(Ordering::Acquire));
        assert!(rx.pop().is_none());
    }
}
