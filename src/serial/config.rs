// src/serial/config.rs

//! Port configuration
//!
//! [`configure`] validates every parameter before it touches the hardware:
//! a rejected configuration leaves all UART registers exactly as they were.

use super::backend::{Register, SerialHardware};
use super::constants::*;
use super::error::ConfigError;
use crate::arch::PortTable;
use crate::sync::{InterruptController, without_interrupts};

/// Serial port slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortId {
    Com1,
    Com2,
}

impl PortId {
    /// IRQ line the port is wired to on a PC
    pub const fn irq(self) -> u8 {
        match self {
            PortId::Com1 => COM1_IRQ,
            PortId::Com2 => COM2_IRQ,
        }
    }

    /// Conventional base I/O address
    pub const fn standard_base(self) -> u16 {
        match self {
            PortId::Com1 => COM1_BASE,
            PortId::Com2 => COM2_BASE,
        }
    }
}

impl TryFrom<u8> for PortId {
    type Error = ConfigError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            1 => Ok(PortId::Com1),
            2 => Ok(PortId::Com2),
            _ => Err(ConfigError::PortNotPresent),
        }
    }
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Parity {
    /// Line control register encoding
    pub const fn line_bits(self) -> u8 {
        match self {
            Parity::None => LCR_PARITY_NONE,
            Parity::Odd => LCR_PARITY_ODD,
            Parity::Even => LCR_PARITY_EVEN,
        }
    }
}

/// Accepts the raw line control encodings (0x00, 0x08, 0x18)
impl TryFrom<u8> for Parity {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            LCR_PARITY_NONE => Ok(Parity::None),
            LCR_PARITY_ODD => Ok(Parity::Odd),
            LCR_PARITY_EVEN => Ok(Parity::Even),
            _ => Err(ConfigError::InvalidLineParameters),
        }
    }
}

/// Requested line parameters, prior to validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSettings {
    pub port: PortId,
    /// Bits per second; validated by [`configure`]
    pub baud: i32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: u8,
}

impl LineSettings {
    /// 8 data bits, no parity, 1 stop bit
    pub const fn eight_n_one(port: PortId, baud: i32) -> Self {
        Self {
            port,
            baud,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: 1,
        }
    }

    /// Validate and apply these settings.
    pub fn configure<P>(&self, platform: &P) -> Result<PortConfig, ConfigError>
    where
        P: SerialHardware + InterruptController + PortTable + ?Sized,
    {
        configure(
            platform,
            self.port,
            self.baud,
            self.parity,
            self.data_bits,
            self.stop_bits,
        )
    }
}

/// COM1, 1200 baud, 7 data bits, no parity, 1 stop bit
impl Default for LineSettings {
    fn default() -> Self {
        Self {
            port: PortId::Com1,
            baud: 1200,
            parity: Parity::None,
            data_bits: 7,
            stop_bits: 1,
        }
    }
}

/// A configuration that has been validated and written to the hardware.
///
/// Only [`configure`] creates one, so holding a `PortConfig` proves the port
/// exists and is programmed. It is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    port: PortId,
    base: u16,
    baud: u32,
    divisor: u16,
    parity: Parity,
    data_bits: u8,
    stop_bits: u8,
}

impl PortConfig {
    pub const fn port(&self) -> PortId {
        self.port
    }

    /// Base register address resolved from the platform
    pub const fn base(&self) -> u16 {
        self.base
    }

    pub const fn irq(&self) -> u8 {
        self.port.irq()
    }

    pub const fn baud(&self) -> u32 {
        self.baud
    }

    pub const fn divisor(&self) -> u16 {
        self.divisor
    }

    pub const fn parity(&self) -> Parity {
        self.parity
    }

    pub const fn data_bits(&self) -> u8 {
        self.data_bits
    }

    pub const fn stop_bits(&self) -> u8 {
        self.stop_bits
    }

    /// Line control register value (DLAB clear)
    pub const fn line_control(&self) -> u8 {
        // Validated at construction
        let stop = if self.stop_bits == 2 { LCR_TWO_STOP_BITS } else { 0 };
        (self.data_bits - 5) | stop | self.parity.line_bits()
    }

    /// Read the divisor latch and line control back and compare.
    pub fn verify<P>(&self, platform: &P) -> bool
    where
        P: SerialHardware + InterruptController + ?Sized,
    {
        let base = self.base;
        let (divisor, lcr) = without_interrupts(platform, || {
            let lcr = platform.read(base, Register::LineControl);
            platform.write(base, Register::LineControl, lcr | LCR_DLAB);
            let low = platform.read(base, Register::DivisorLatchLow);
            let high = platform.read(base, Register::DivisorLatchHigh);
            platform.write(base, Register::LineControl, lcr);
            ((u16::from(high) << 8) | u16::from(low), lcr)
        });
        divisor == self.divisor && lcr == self.line_control()
    }

    fn apply<P>(&self, platform: &P)
    where
        P: SerialHardware + InterruptController + ?Sized,
    {
        let base = self.base;
        let [low, high] = self.divisor.to_le_bytes();

        without_interrupts(platform, || {
            platform.write(base, Register::FifoControl, FCR_DISABLED);
            let lcr = platform.read(base, Register::LineControl);
            platform.write(base, Register::LineControl, lcr | LCR_DLAB);
            platform.write(base, Register::DivisorLatchLow, low);
            platform.write(base, Register::DivisorLatchHigh, high);
            platform.write(base, Register::LineControl, lcr);
        });

        without_interrupts(platform, || {
            platform.write(base, Register::LineControl, self.line_control());
        });
    }
}

/// Divisor latch value for `baud`, rounded to the nearest integer.
///
/// `None` when `baud` is not positive or the divisor falls outside 1..=0xFFFF.
pub const fn divisor_for(baud: i32) -> Option<u16> {
    if baud <= 0 {
        return None;
    }
    let baud = baud as u32;
    let divisor = (BAUD_BASE + baud / 2) / baud;
    if divisor == 0 || divisor > u16::MAX as u32 {
        None
    } else {
        Some(divisor as u16)
    }
}

fn validate<P>(
    platform: &P,
    port: PortId,
    baud: i32,
    parity: Parity,
    data_bits: u8,
    stop_bits: u8,
) -> Result<PortConfig, ConfigError>
where
    P: PortTable + ?Sized,
{
    let divisor = divisor_for(baud).ok_or(ConfigError::InvalidBaudRate)?;
    if !(5..=8).contains(&data_bits) || !(1..=2).contains(&stop_bits) {
        return Err(ConfigError::InvalidLineParameters);
    }
    let base = platform
        .base_address(port)
        .ok_or(ConfigError::PortNotPresent)?;

    Ok(PortConfig {
        port,
        base,
        baud: baud as u32,
        divisor,
        parity,
        data_bits,
        stop_bits,
    })
}

/// Validate the parameters, resolve the port and program the UART.
///
/// On success the divisor latch and line control register have been written,
/// each register sequence inside its own critical section. On failure nothing
/// has been written.
pub fn configure<P>(
    platform: &P,
    port: PortId,
    baud: i32,
    parity: Parity,
    data_bits: u8,
    stop_bits: u8,
) -> Result<PortConfig, ConfigError>
where
    P: SerialHardware + InterruptController + PortTable + ?Sized,
{
    let config = validate(platform, port, baud, parity, data_bits, stop_bits)
        .inspect_err(|err| log::debug!("serial: {:?} configuration rejected: {}", port, err))?;

    config.apply(platform);
    log::info!(
        "serial: {:?} at {:#x} configured {} baud, {}{}{}",
        port,
        config.base,
        config.baud,
        data_bits,
        match parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        },
        stop_bits
    );
    Ok(config)
}
