// src/serial/mod.rs

//! Interrupt-driven serial link on a 16550-compatible UART
//!
//! Provides:
//! - Port configuration (baud divisor, data bits, parity, stop bits)
//! - Background reception: the receive interrupt fills a lock-free ring
//! - Non-blocking polling of received bytes with sticky overflow detection
//! - Flow-controlled (CTS) transmission with deadline-bounded waits
//! - Explicit install/enable/disable/restore of the receive vector
//!
//! # Usage
//!
//! ```ignore
//! static PLATFORM: PcPlatform = PcPlatform::new(DEFAULT_TSC_CYCLES_PER_MICRO);
//! static COM1: Channel<PcPlatform> = Channel::new();
//!
//! let mut link = Serial::open(&PLATFORM, &COM1, &LineSettings::default())?;
//! link.send_string(b"ATZ\r")?;
//! while let Some(byte) = link.poll()? {
//!     // ...
//! }
//! if link.take_overflow() {
//!     // bytes were lost
//! }
//! link.close()?;
//! ```

pub mod backend;
pub mod channel;
pub mod config;
pub mod constants;
mod error;
pub mod lifecycle;
pub mod ring;
pub mod timeout;
pub mod transmit;

pub use backend::{Register as SerialRegister, SerialHardware};
pub use channel::Channel;
pub use config::{LineSettings, Parity, PortConfig, PortId, configure, divisor_for};
pub use error::{ConfigError, LifecycleError, SerialError, WaitStage};
pub use lifecycle::{InterruptHandle, LifecycleState};
pub use timeout::{BackoffStrategy, Clock, TimeoutConfig, TimeoutError};
pub use transmit::TransmitConfig;

use crate::arch::Platform;
use crate::diagnostics::LinkSnapshot;
use crate::sync::without_interrupts;
use backend::Register;
use constants::{DEFAULT_RX_CAPACITY, MCR_DTR, MCR_RTS};
use core::fmt;
use ring::{Consumer, Producer};

/// A configured serial link
///
/// Owns the port configuration, the receive vector and the read half of the
/// channel's ring. Only one `Serial` can use a channel at a time.
pub struct Serial<P: Platform + 'static, const N: usize = DEFAULT_RX_CAPACITY> {
    platform: &'static P,
    channel: &'static Channel<P, N>,
    config: PortConfig,
    transmit: TransmitConfig,
    // Declared before `consumer`: the handle releases the vector first
    handle: InterruptHandle<P, N>,
    consumer: Consumer<'static, N>,
}

impl<P: Platform + 'static, const N: usize> Serial<P, N> {
    /// Take ownership of `channel` for an already configured port.
    ///
    /// Nothing is installed yet; see [`Serial::open`] for the full bring-up.
    pub fn new(
        platform: &'static P,
        channel: &'static Channel<P, N>,
        config: PortConfig,
    ) -> Result<Self, SerialError> {
        let (producer, consumer) = channel.split().ok_or(LifecycleError::ChannelBusy)?;
        Ok(Self::from_parts(platform, channel, config, producer, consumer))
    }

    /// Configure the port, install and enable the receive interrupt, then
    /// raise DTR and RTS to tell the peer we are on line.
    pub fn open(
        platform: &'static P,
        channel: &'static Channel<P, N>,
        settings: &LineSettings,
    ) -> Result<Self, SerialError> {
        // Claim the channel first: a busy channel must leave the port alone
        let (producer, consumer) = channel.split().ok_or(LifecycleError::ChannelBusy)?;
        let config = settings.configure(platform)?;
        let mut serial = Self::from_parts(platform, channel, config, producer, consumer);
        serial.install()?;
        serial.enable()?;
        serial.set_modem_lines(MCR_DTR | MCR_RTS);
        log::info!("serial: {:?} on line", config.port());
        Ok(serial)
    }

    fn from_parts(
        platform: &'static P,
        channel: &'static Channel<P, N>,
        config: PortConfig,
        producer: Producer<'static, N>,
        consumer: Consumer<'static, N>,
    ) -> Self {
        Self {
            platform,
            channel,
            config,
            transmit: TransmitConfig::default(),
            handle: InterruptHandle::new(platform, channel, &config, producer),
            consumer,
        }
    }

    /// Disable reception, drop the modem lines and restore the vector.
    pub fn close(mut self) -> Result<(), SerialError> {
        self.disable()?;
        self.clear_modem_lines();
        self.restore()?;
        log::info!("serial: {:?} off line", self.config.port());
        Ok(())
    }

    /// Replace the transmit deadlines
    pub fn with_transmit_config(mut self, transmit: TransmitConfig) -> Self {
        self.transmit = transmit;
        self
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.handle.state()
    }

    /// Install the receive handler; the ring starts out empty.
    pub fn install(&mut self) -> Result<(), SerialError> {
        self.handle.install()?;
        self.consumer.reset();
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), SerialError> {
        self.handle.enable()?;
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), SerialError> {
        self.handle.disable()?;
        Ok(())
    }

    pub fn restore(&mut self) -> Result<(), SerialError> {
        self.handle.restore()?;
        Ok(())
    }

    /// Next received byte, or `None` if nothing is buffered. Never blocks.
    pub fn poll(&mut self) -> Result<Option<u8>, SerialError> {
        self.ensure_live()?;
        Ok(self.consumer.pop())
    }

    /// Move as many buffered bytes as fit into `buf`.
    pub fn drain(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        self.ensure_live()?;
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.consumer.pop() {
                Some(byte) => *slot = byte,
                None => break,
            }
            count += 1;
        }
        Ok(count)
    }

    /// Bytes waiting to be polled
    pub fn pending(&self) -> usize {
        self.consumer.len()
    }

    /// Whether received bytes were lost since the last call. Clears the flag.
    pub fn take_overflow(&mut self) -> bool {
        let lost = self.consumer.take_overflow();
        if lost {
            log::warn!(
                "serial: receive buffer overflow ({} bytes dropped so far)",
                self.channel.stats().snapshot().bytes_dropped
            );
        }
        lost
    }

    /// Send one byte under CTS flow control.
    pub fn send(&mut self, byte: u8) -> Result<(), SerialError> {
        self.ensure_live()?;
        let stats = self.channel.stats();
        transmit::send_byte(self.platform, self.config.base(), &self.transmit, byte)
            .inspect_err(|err| {
                stats.record_transmit_timeout();
                log::warn!("serial: {}", err);
            })?;
        stats.record_sent();
        Ok(())
    }

    /// Send `bytes` in order, stopping at the first failure.
    pub fn send_string(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        bytes.iter().try_for_each(|&byte| self.send(byte))
    }

    /// Link counters
    pub fn stats(&self) -> LinkSnapshot {
        self.channel.stats().snapshot()
    }

    fn ensure_live(&self) -> Result<(), SerialError> {
        if self.handle.is_consumed() {
            return Err(LifecycleError::HandleConsumed.into());
        }
        Ok(())
    }

    fn set_modem_lines(&self, lines: u8) {
        let (platform, base) = (self.platform, self.config.base());
        without_interrupts(platform, || {
            let mcr = platform.read(base, Register::ModemControl);
            platform.write(base, Register::ModemControl, mcr | lines);
        });
    }

    fn clear_modem_lines(&self) {
        let (platform, base) = (self.platform, self.config.base());
        without_interrupts(platform, || platform.write(base, Register::ModemControl, 0));
    }
}

impl<P: Platform + 'static, const N: usize> fmt::Write for Serial<P, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.send_string(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimPlatform;
    use core::fmt::Write;

    fn link() -> (&'static SimPlatform, Serial<SimPlatform, 16>) {
        let sim: &'static SimPlatform = Box::leak(Box::new(SimPlatform::new()));
        let channel: &'static Channel<SimPlatform, 16> = Box::leak(Box::new(Channel::new()));
        let serial = Serial::open(sim, channel, &LineSettings::default()).unwrap();
        (sim, serial)
    }

    #[test]
    fn test_open_brings_link_on_line() {
        let (sim, serial) = link();
        assert_eq!(serial.state(), LifecycleState::Enabled);
        assert_eq!(sim.modem_control() & (MCR_DTR | MCR_RTS), MCR_DTR | MCR_RTS);
    }

    #[test]
    fn test_drain_collects_in_order() {
        let (sim, mut serial) = link();
        sim.deliver_all(b"hello");

        let mut buf = [0u8; 3];
        assert_eq!(serial.drain(&mut buf), Ok(3));
        assert_eq!(&buf, b"hel");
        assert_eq!(serial.pending(), 2);
        assert_eq!(serial.drain(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"lo");
    }

    #[test]
    fn test_fmt_write_sends() {
        let (sim, mut serial) = link();
        write!(serial, "AT{}", 7).unwrap();
        assert_eq!(sim.transmitted().as_slice(), b"AT7");
        assert_eq!(serial.stats().bytes_sent, 3);
    }

    #[test]
    fn test_channel_is_exclusive() {
        let sim: &'static SimPlatform = Box::leak(Box::new(SimPlatform::new()));
        let channel: &'static Channel<SimPlatform, 16> = Box::leak(Box::new(Channel::new()));
        let config = LineSettings::default().configure(sim).unwrap();

        let first = Serial::new(sim, channel, config).unwrap();
        assert!(matches!(
            Serial::new(sim, channel, config),
            Err(SerialError::Lifecycle(LifecycleError::ChannelBusy))
        ));
        drop(first);
        assert!(Serial::new(sim, channel, config).is_ok());
    }

    #[test]
    fn test_open_on_busy_channel_leaves_port_alone() {
        let (sim, serial) = link();
        let channel = serial.channel;
        let writes = sim.register_writes();

        let second = Serial::open(
            sim,
            channel,
            &LineSettings::eight_n_one(PortId::Com1, 9600),
        );
        assert!(matches!(
            second,
            Err(SerialError::Lifecycle(LifecycleError::ChannelBusy))
        ));
        assert_eq!(sim.register_writes(), writes);
        assert_eq!(sim.divisor(), 96);
        assert_eq!(sim.line_control(), 0x02);

        sim.deliver_all(b"ok");
        let mut serial = serial;
        assert_eq!(serial.poll(), Ok(Some(b'o')));
        assert_eq!(serial.poll(), Ok(Some(b'k')));
    }

    #[test]
    fn test_close_drops_lines_and_releases_channel() {
        let (sim, serial) = link();
        serial.close().unwrap();
        assert_eq!(sim.modem_control(), 0);
        assert!(sim.vector(crate::serial::constants::COM1_IRQ).is_none());
        assert_eq!(sim.critical_depth(), 0);
    }
}
