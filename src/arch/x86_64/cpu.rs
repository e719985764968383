// src/arch/x86_64/cpu.rs

use crate::serial::timeout::Clock;
use core::time::Duration;

/// Conservative TSC rate (2 GHz) for when the kernel has not calibrated one
pub const DEFAULT_TSC_CYCLES_PER_MICRO: u64 = 2_000;

/// Read the Time Stamp Counter (TSC).
#[inline]
pub fn read_timestamp() -> u64 {
    // SAFETY: RDTSC has no side effects and is available on every x86_64 CPU
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Clock derived from the TSC at a fixed rate
#[derive(Debug, Clone, Copy)]
pub struct TscClock {
    cycles_per_micro: u64,
}

impl TscClock {
    pub const fn new(cycles_per_micro: u64) -> Self {
        // A zero rate would divide by zero in `now`
        let cycles_per_micro = if cycles_per_micro == 0 {
            DEFAULT_TSC_CYCLES_PER_MICRO
        } else {
            cycles_per_micro
        };
        Self { cycles_per_micro }
    }

    pub const fn cycles_per_micro(&self) -> u64 {
        self.cycles_per_micro
    }
}

impl Default for TscClock {
    fn default() -> Self {
        Self::new(DEFAULT_TSC_CYCLES_PER_MICRO)
    }
}

impl Clock for TscClock {
    fn now(&self) -> Duration {
        Duration::from_micros(read_timestamp() / self.cycles_per_micro)
    }
}
