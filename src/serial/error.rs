// src/serial/error.rs

//! Error types for serial port operations

use super::timeout::TimeoutError;
use core::fmt;

/// Port configuration errors
///
/// Reported synchronously; no hardware register has been written when one of
/// these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The platform reports no device at the requested slot
    PortNotPresent,
    /// Baud rate not positive, or divisor does not fit the 16-bit latch
    InvalidBaudRate,
    /// Data bits, stop bits or parity out of range
    InvalidLineParameters,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::PortNotPresent => write!(f, "Serial port hardware not present"),
            ConfigError::InvalidBaudRate => write!(f, "Invalid baud rate"),
            ConfigError::InvalidLineParameters => write!(f, "Invalid line parameters"),
        }
    }
}

/// Interrupt lifecycle contract violations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// `install` called twice without an intervening `restore`
    AlreadyInstalled,
    /// Operation requires an installed vector
    NotInstalled,
    /// `restore` called while the interrupt source is still enabled
    StillEnabled,
    /// The handle was restored; no further operation is possible
    HandleConsumed,
    /// The channel's receive ring is already owned by another link
    ChannelBusy,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::AlreadyInstalled => write!(f, "Interrupt handler already installed"),
            LifecycleError::NotInstalled => write!(f, "Interrupt handler not installed"),
            LifecycleError::StillEnabled => {
                write!(f, "Interrupt source still enabled; disable before restore")
            }
            LifecycleError::HandleConsumed => write!(f, "Interrupt handle already restored"),
            LifecycleError::ChannelBusy => write!(f, "Receive channel already in use"),
        }
    }
}

/// Which busy-wait of the transmit path ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// Waiting for the peer's clear-to-send
    ClearToSend,
    /// Waiting for the transmitter holding register to empty
    TransmitterEmpty,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitStage::ClearToSend => write!(f, "clear-to-send"),
            WaitStage::TransmitterEmpty => write!(f, "transmitter empty"),
        }
    }
}

/// Top-level serial error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// Configuration rejected
    Config(ConfigError),
    /// Lifecycle call made out of order
    Lifecycle(LifecycleError),
    /// Transmit timed out; the byte was not sent
    Timeout {
        stage: WaitStage,
        detail: TimeoutError,
    },
}

impl SerialError {
    /// Whether this is a recoverable transmit timeout
    pub const fn is_timeout(&self) -> bool {
        matches!(self, SerialError::Timeout { .. })
    }
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerialError::Config(e) => write!(f, "Serial configuration error: {}", e),
            SerialError::Lifecycle(e) => write!(f, "Serial lifecycle error: {}", e),
            SerialError::Timeout { stage, detail } => {
                write!(f, "Serial transmit timeout waiting for {}: {}", stage, detail)
            }
        }
    }
}

impl From<ConfigError> for SerialError {
    fn from(err: ConfigError) -> Self {
        SerialError::Config(err)
    }
}

impl From<LifecycleError> for SerialError {
    fn from(err: LifecycleError) -> Self {
        SerialError::Lifecycle(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            format!("{}", ConfigError::PortNotPresent),
            "Serial port hardware not present"
        );
    }

    #[test]
    fn test_serial_error_wraps_lifecycle() {
        let err: SerialError = LifecycleError::HandleConsumed.into();
        assert_eq!(err, SerialError::Lifecycle(LifecycleError::HandleConsumed));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_display_names_stage() {
        let err = SerialError::Timeout {
            stage: WaitStage::ClearToSend,
            detail: TimeoutError {
                polls: 3,
                elapsed: Duration::from_micros(30),
            },
        };
        assert!(err.is_timeout());
        assert!(format!("{}", err).contains("clear-to-send"));
    }
}
