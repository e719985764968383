// src/serial/timeout.rs

//! Timeout handling for serial operations
//!
//! Busy-waits in the transmit path are bounded by a deadline measured on an
//! injected [`Clock`] rather than by a raw iteration count, so the bound is
//! the same on every platform and tests can drive it with a fake clock.

use core::fmt;
use core::time::Duration;

/// Monotonic time source
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed epoch.
    fn now(&self) -> Duration;
}

/// Timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeoutConfig {
    /// Time allowed before the wait gives up
    pub budget: Duration,
    /// Backoff strategy between polls
    pub backoff: BackoffStrategy,
}

impl TimeoutConfig {
    /// A plain busy-wait bounded by `budget`
    pub const fn new(budget: Duration) -> Self {
        Self {
            budget,
            backoff: BackoffStrategy::None,
        }
    }

    /// Default timeout, roughly what 0xFFFF status reads take on a PC bus
    pub const fn default_timeout() -> Self {
        Self::new(Duration::from_millis(65))
    }

    /// Short timeout for quick operations
    pub const fn short_timeout() -> Self {
        Self::new(Duration::from_millis(1))
    }

    /// Replace the backoff strategy
    pub const fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::default_timeout()
    }
}

/// Backoff strategy for polling operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackoffStrategy {
    /// No backoff, busy-wait
    None,
    /// Linear backoff (wait n spin hints after poll n)
    Linear,
    /// Exponential backoff with max
    Exponential { base: u32, max: u32 },
}

/// Timeout context for tracking a single wait
pub struct TimeoutContext<'c, C: Clock + ?Sized> {
    clock: &'c C,
    config: TimeoutConfig,
    start: Duration,
    polls: u32,
    total_waits: u64,
}

impl<'c, C: Clock + ?Sized> TimeoutContext<'c, C> {
    /// Arm a new deadline `config.budget` from now
    pub fn new(clock: &'c C, config: TimeoutConfig) -> Self {
        Self {
            clock,
            config,
            start: clock.now(),
            polls: 0,
            total_waits: 0,
        }
    }

    /// Time spent since the context was armed
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.start)
    }

    /// Check if the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.config.budget
    }

    /// Perform one iteration with backoff
    ///
    /// Returns false if the deadline passed
    pub fn tick(&mut self) -> bool {
        if self.is_expired() {
            return false;
        }

        self.polls = self.polls.saturating_add(1);

        let wait_iterations = self.calculate_backoff();
        self.total_waits += u64::from(wait_iterations);

        for _ in 0..wait_iterations {
            core::hint::spin_loop();
        }

        true
    }

    /// Calculate backoff delay for current iteration
    fn calculate_backoff(&self) -> u32 {
        match self.config.backoff {
            BackoffStrategy::None => 0,
            BackoffStrategy::Linear => self.polls,
            BackoffStrategy::Exponential { base, max } => base.saturating_pow(self.polls).min(max),
        }
    }

    /// Number of completed poll iterations
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Total spin hints issued as backoff
    pub fn total_waits(&self) -> u64 {
        self.total_waits
    }

    fn expired_error(&self) -> TimeoutError {
        TimeoutError {
            polls: self.polls,
            elapsed: self.elapsed(),
        }
    }
}

/// Timeout operation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutResult<T> {
    /// Operation completed successfully
    Ok(T),
    /// Operation timed out
    Timeout(TimeoutError),
}

impl<T> TimeoutResult<T> {
    /// Convert to standard Result
    pub fn into_result(self) -> Result<T, TimeoutError> {
        match self {
            TimeoutResult::Ok(v) => Ok(v),
            TimeoutResult::Timeout(err) => Err(err),
        }
    }

    /// Check if operation succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, TimeoutResult::Ok(_))
    }

    /// Check if operation timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutResult::Timeout(_))
    }
}

/// Timeout error with diagnostic information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutError {
    pub polls: u32,
    pub elapsed: Duration,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation timeout after {} polls ({} us)",
            self.polls,
            self.elapsed.as_micros()
        )
    }
}

/// Poll a condition until it holds or the deadline passes
///
/// The condition is always evaluated at least once, even with a zero budget.
pub fn poll_with_timeout<C, F>(
    clock: &C,
    config: TimeoutConfig,
    mut condition: F,
) -> TimeoutResult<()>
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    poll_with_timeout_value(clock, config, || condition().then_some(()))
}

/// Poll a condition with timeout and return a value
///
/// The condition function returns `Option<T>`:
/// - `Some(value)` indicates success
/// - `None` indicates not ready yet
pub fn poll_with_timeout_value<C, F, T>(
    clock: &C,
    config: TimeoutConfig,
    mut condition: F,
) -> TimeoutResult<T>
where
    C: Clock + ?Sized,
    F: FnMut() -> Option<T>,
{
    let mut ctx = TimeoutContext::new(clock, config);

    loop {
        if let Some(value) = condition() {
            return TimeoutResult::Ok(value);
        }
        if !ctx.tick() {
            return TimeoutResult::Timeout(ctx.expired_error());
        }
    }
}
