// src/sync/mod.rs

//! Synchronization primitives
//!
//! The serial link runs on a single hardware thread with one preemptive,
//! non-reentrant interrupt level. Foreground code that touches registers the
//! receive handler also uses must do so inside a [`CriticalSection`], which
//! keeps the handler out for the duration of the register sequence and is
//! released on every exit path.

pub mod interrupt;

pub use interrupt::{CriticalSection, InterruptController, without_interrupts};
