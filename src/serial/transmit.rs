// src/serial/transmit.rs

//! Transmit path
//!
//! One byte at a time under hardware flow control: raise DTR/RTS, wait for
//! the peer's CTS, wait for the holding register to empty, write. Both waits
//! are bounded by a deadline. Interrupts are disabled only around register
//! writes, never across a wait.

use super::backend::{Register, SerialHardware};
use super::constants::{LSR_THR_EMPTY, MCR_DTR, MCR_RTS, MSR_CTS};
use super::error::{SerialError, WaitStage};
use super::timeout::{Clock, TimeoutConfig, poll_with_timeout};
use crate::sync::{InterruptController, without_interrupts};

/// Deadlines for the two transmit waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransmitConfig {
    /// Wait for the peer's clear-to-send
    pub clear_to_send: TimeoutConfig,
    /// Wait for the transmitter holding register to empty
    pub transmitter_empty: TimeoutConfig,
}

impl TransmitConfig {
    /// Same deadline for both waits
    pub const fn uniform(timeout: TimeoutConfig) -> Self {
        Self {
            clear_to_send: timeout,
            transmitter_empty: timeout,
        }
    }
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self::uniform(TimeoutConfig::default_timeout())
    }
}

/// Send one byte. On timeout the transmit register has not been written.
pub fn send_byte<P>(
    platform: &P,
    base: u16,
    config: &TransmitConfig,
    byte: u8,
) -> Result<(), SerialError>
where
    P: SerialHardware + InterruptController + Clock + ?Sized,
{
    without_interrupts(platform, || {
        let mcr = platform.read(base, Register::ModemControl);
        platform.write(base, Register::ModemControl, mcr | MCR_DTR | MCR_RTS);
    });

    poll_with_timeout(platform, config.clear_to_send, || {
        platform.read(base, Register::ModemStatus) & MSR_CTS != 0
    })
    .into_result()
    .map_err(|detail| SerialError::Timeout {
        stage: WaitStage::ClearToSend,
        detail,
    })?;

    poll_with_timeout(platform, config.transmitter_empty, || {
        platform.read(base, Register::LineStatus) & LSR_THR_EMPTY != 0
    })
    .into_result()
    .map_err(|detail| SerialError::Timeout {
        stage: WaitStage::TransmitterEmpty,
        detail,
    })?;

    without_interrupts(platform, || platform.write(base, Register::Data, byte));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimPlatform;
    use crate::serial::config::LineSettings;
    use core::time::Duration;

    fn quick() -> TransmitConfig {
        TransmitConfig::uniform(TimeoutConfig::new(Duration::from_micros(50)))
    }

    #[test]
    fn test_send_writes_byte_and_raises_lines() {
        let sim = SimPlatform::new();
        let cfg = LineSettings::default().configure(&sim).unwrap();

        send_byte(&sim, cfg.base(), &quick(), b'A').unwrap();

        assert_eq!(sim.transmitted().as_slice(), b"A");
        assert_eq!(sim.modem_control() & (MCR_DTR | MCR_RTS), MCR_DTR | MCR_RTS);
        assert_eq!(sim.critical_depth(), 0);
    }

    #[test]
    fn test_send_waits_unguarded_and_writes_guarded() {
        let sim = SimPlatform::new();
        let cfg = LineSettings::default().configure(&sim).unwrap();
        sim.clear_accesses();

        send_byte(&sim, cfg.base(), &quick(), b'A').unwrap();

        let log = sim.accesses();
        assert_eq!(log.writes_to(Register::Data).count(), 1);
        assert!(log.writes_to(Register::ModemControl).count() > 0);
        assert!(log.iter().filter(|a| a.write).all(|a| a.guarded));
        assert!(log.reads_of(Register::ModemStatus).count() > 0);
        assert!(log.reads_of(Register::ModemStatus).all(|a| !a.guarded));
        assert!(log.reads_of(Register::LineStatus).count() > 0);
        assert!(log.reads_of(Register::LineStatus).all(|a| !a.guarded));
    }

    #[test]
    fn test_no_clear_to_send_times_out_without_writing() {
        let sim = SimPlatform::new();
        let cfg = LineSettings::default().configure(&sim).unwrap();
        sim.set_clear_to_send(false);

        let err = send_byte(&sim, cfg.base(), &quick(), b'A').unwrap_err();

        match err {
            SerialError::Timeout { stage, detail } => {
                assert_eq!(stage, WaitStage::ClearToSend);
                assert!(detail.elapsed >= Duration::from_micros(50));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(sim.transmitted().is_empty());
        assert!(sim.interrupts_enabled());
        // The whole wait ran with interrupts on
        let log = sim.accesses();
        assert!(log.reads_of(Register::ModemStatus).count() > 1);
        assert!(log.reads_of(Register::ModemStatus).all(|a| !a.guarded));
        assert_eq!(log.writes_to(Register::Data).count(), 0);
    }

    #[test]
    fn test_busy_transmitter_times_out() {
        let sim = SimPlatform::new();
        let cfg = LineSettings::default().configure(&sim).unwrap();
        sim.set_transmitter_ready(false);

        let err = send_byte(&sim, cfg.base(), &quick(), b'A').unwrap_err();

        assert!(matches!(
            err,
            SerialError::Timeout {
                stage: WaitStage::TransmitterEmpty,
                ..
            }
        ));
        assert!(sim.transmitted().is_empty());
    }
}
