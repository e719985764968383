// src/serial/lifecycle.rs

//! Interrupt lifecycle
//!
//! ```text
//! Uninitialized --install--> Installed --enable--> Enabled
//!                                |                   |  ^
//!                                |                disable|enable
//!                                |                   v  |
//!                                +-----disable----> Disabled --restore--> Restored
//! ```
//!
//! `restore` runs only from `Disabled`, so the previous vector is never put
//! back while the UART can still raise an interrupt aimed at this link's
//! handler. A restored handle is spent.

use super::backend::Register;
use super::channel::{Binding, Channel};
use super::config::PortConfig;
use super::constants::{IER_RX_DATA, MCR_OUT2};
use super::error::LifecycleError;
use super::ring::Producer;
use crate::arch::{IrqHandler, Platform};
use crate::sync::without_interrupts;

/// Lifecycle position of an [`InterruptHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Installed,
    Enabled,
    Disabled,
    Restored,
}

/// Ownership of the receive interrupt vector for one port
pub struct InterruptHandle<P: Platform + 'static, const N: usize> {
    platform: &'static P,
    channel: &'static Channel<P, N>,
    base: u16,
    irq: u8,
    state: LifecycleState,
    saved: Option<IrqHandler>,
    producer: Option<Producer<'static, N>>,
}

impl<P: Platform + 'static, const N: usize> InterruptHandle<P, N> {
    pub(crate) fn new(
        platform: &'static P,
        channel: &'static Channel<P, N>,
        config: &PortConfig,
        producer: Producer<'static, N>,
    ) -> Self {
        Self {
            platform,
            channel,
            base: config.base(),
            irq: config.irq(),
            state: LifecycleState::Uninitialized,
            saved: None,
            producer: Some(producer),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_consumed(&self) -> bool {
        self.state == LifecycleState::Restored
    }

    pub fn irq(&self) -> u8 {
        self.irq
    }

    /// Save the current vector and install the link's handler.
    pub fn install(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Uninitialized => {}
            LifecycleState::Restored => return Err(LifecycleError::HandleConsumed),
            _ => return Err(LifecycleError::AlreadyInstalled),
        }
        let producer = self.producer.take().ok_or(LifecycleError::HandleConsumed)?;

        let platform = self.platform;
        let channel = self.channel;
        let (base, irq) = (self.base, self.irq);
        let handler: IrqHandler = channel;

        self.saved = without_interrupts(platform, || {
            channel.bind(Binding {
                platform,
                base,
                irq,
                producer,
            });
            platform.swap_vector(irq, Some(handler))
        });
        self.state = LifecycleState::Installed;
        log::debug!("serial: handler installed on irq {}", irq);
        Ok(())
    }

    /// Enable the receive interrupt at the UART and unmask the line.
    pub fn enable(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Installed | LifecycleState::Disabled => {}
            LifecycleState::Enabled => return Ok(()),
            LifecycleState::Uninitialized => return Err(LifecycleError::NotInstalled),
            LifecycleState::Restored => return Err(LifecycleError::HandleConsumed),
        }

        let platform = self.platform;
        let (base, irq) = (self.base, self.irq);
        without_interrupts(platform, || {
            let mcr = platform.read(base, Register::ModemControl);
            platform.write(base, Register::ModemControl, mcr | MCR_OUT2);
            platform.write(base, Register::InterruptEnable, IER_RX_DATA);
            platform.unmask_irq(irq);
        });
        self.state = LifecycleState::Enabled;
        log::debug!("serial: irq {} enabled", irq);
        Ok(())
    }

    /// Mask the line and turn the UART's receive interrupt off.
    ///
    /// Redundant calls are harmless.
    pub fn disable(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Installed | LifecycleState::Enabled => {}
            LifecycleState::Uninitialized | LifecycleState::Disabled => return Ok(()),
            LifecycleState::Restored => return Err(LifecycleError::HandleConsumed),
        }

        let platform = self.platform;
        let (base, irq) = (self.base, self.irq);
        without_interrupts(platform, || {
            platform.mask_irq(irq);
            platform.write(base, Register::InterruptEnable, 0);
            let mcr = platform.read(base, Register::ModemControl);
            platform.write(base, Register::ModemControl, mcr & !MCR_OUT2);
        });
        self.state = LifecycleState::Disabled;
        log::debug!("serial: irq {} disabled", irq);
        Ok(())
    }

    /// Put the saved vector back. The handle is spent afterwards.
    ///
    /// Requires `Disabled`; an installed handle must be disabled first.
    pub fn restore(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Disabled => {}
            LifecycleState::Installed | LifecycleState::Enabled => {
                return Err(LifecycleError::StillEnabled);
            }
            LifecycleState::Uninitialized => return Err(LifecycleError::NotInstalled),
            LifecycleState::Restored => return Err(LifecycleError::HandleConsumed),
        }

        let platform = self.platform;
        let channel = self.channel;
        let irq = self.irq;
        let saved = self.saved.take();
        let binding = without_interrupts(platform, || {
            platform.swap_vector(irq, saved);
            channel.unbind()
        });
        // Dropping the binding hands the producer half back to the ring
        drop(binding);

        self.state = LifecycleState::Restored;
        log::debug!("serial: vector for irq {} restored", irq);
        Ok(())
    }
}

impl<P: Platform + 'static, const N: usize> Drop for InterruptHandle<P, N> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            LifecycleState::Installed | LifecycleState::Enabled | LifecycleState::Disabled
        ) {
            log::warn!("serial: handle for irq {} dropped while installed", self.irq);
            let _ = self.disable();
            let _ = self.restore();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimPlatform;
    use crate::arch::{InterruptService, VectorTable};
    use crate::serial::config::LineSettings;
    use crate::serial::constants::{COM1_IRQ, MCR_OUT2};

    struct PreviousHandler;

    impl InterruptService for PreviousHandler {
        fn service(&self) {}
    }

    static PREVIOUS: PreviousHandler = PreviousHandler;

    fn handle() -> (&'static SimPlatform, InterruptHandle<SimPlatform, 8>) {
        let sim: &'static SimPlatform = Box::leak(Box::new(SimPlatform::new()));
        let channel: &'static Channel<SimPlatform, 8> = Box::leak(Box::new(Channel::new()));
        let config = LineSettings::default().configure(sim).unwrap();
        let (producer, _consumer) = channel.split().unwrap();
        (sim, InterruptHandle::new(sim, channel, &config, producer))
    }

    fn installed_is_previous(sim: &SimPlatform) -> bool {
        sim.vector(COM1_IRQ)
            .is_some_and(|h| core::ptr::addr_eq(h, &PREVIOUS as &dyn InterruptService))
    }

    #[test]
    fn test_full_lifecycle() {
        let (sim, mut handle) = handle();
        sim.swap_vector(COM1_IRQ, Some(&PREVIOUS));

        handle.install().unwrap();
        assert_eq!(handle.state(), LifecycleState::Installed);
        assert!(!installed_is_previous(sim));

        handle.enable().unwrap();
        assert!(!sim.is_masked(COM1_IRQ));
        assert_ne!(sim.modem_control() & MCR_OUT2, 0);
        assert_eq!(sim.interrupt_enable(), IER_RX_DATA);

        handle.disable().unwrap();
        assert!(sim.is_masked(COM1_IRQ));
        assert_eq!(sim.modem_control() & MCR_OUT2, 0);
        assert_eq!(sim.interrupt_enable(), 0);

        handle.restore().unwrap();
        assert!(handle.is_consumed());
        assert!(installed_is_previous(sim));
        assert_eq!(sim.critical_depth(), 0);
    }

    #[test]
    fn test_install_twice_fails() {
        let (_sim, mut handle) = handle();
        handle.install().unwrap();
        assert_eq!(handle.install(), Err(LifecycleError::AlreadyInstalled));
    }

    #[test]
    fn test_restore_while_enabled_fails() {
        let (_sim, mut handle) = handle();
        handle.install().unwrap();
        handle.enable().unwrap();
        assert_eq!(handle.restore(), Err(LifecycleError::StillEnabled));
        assert_eq!(handle.state(), LifecycleState::Enabled);
    }

    #[test]
    fn test_restore_requires_disable_first() {
        let (_sim, mut handle) = handle();
        handle.install().unwrap();
        assert_eq!(handle.restore(), Err(LifecycleError::StillEnabled));
        assert_eq!(handle.state(), LifecycleState::Installed);

        handle.disable().unwrap();
        handle.restore().unwrap();
        assert!(handle.is_consumed());
    }

    #[test]
    fn test_channel_bound_while_vector_installed() {
        let (sim, mut handle) = handle();
        let channel = handle.channel;
        sim.swap_vector(COM1_IRQ, Some(&PREVIOUS));
        assert!(!channel.is_bound());

        handle.install().unwrap();
        assert!(channel.is_bound());
        assert!(!installed_is_previous(sim));

        handle.enable().unwrap();
        handle.disable().unwrap();
        assert!(channel.is_bound());

        handle.restore().unwrap();
        assert!(!channel.is_bound());
        assert!(installed_is_previous(sim));
    }

    #[test]
    fn test_enable_requires_install() {
        let (_sim, mut handle) = handle();
        assert_eq!(handle.enable(), Err(LifecycleError::NotInstalled));
        assert_eq!(handle.restore(), Err(LifecycleError::NotInstalled));
    }

    #[test]
    fn test_disable_is_idempotent() {
        let (_sim, mut handle) = handle();
        handle.install().unwrap();
        handle.enable().unwrap();
        handle.disable().unwrap();
        handle.disable().unwrap();
        assert_eq!(handle.state(), LifecycleState::Disabled);
    }

    #[test]
    fn test_consumed_handle_rejects_everything() {
        let (_sim, mut handle) = handle();
        handle.install().unwrap();
        handle.disable().unwrap();
        handle.restore().unwrap();

        assert_eq!(handle.install(), Err(LifecycleError::HandleConsumed));
        assert_eq!(handle.enable(), Err(LifecycleError::HandleConsumed));
        assert_eq!(handle.disable(), Err(LifecycleError::HandleConsumed));
        assert_eq!(handle.restore(), Err(LifecycleError::HandleConsumed));
    }

    #[test]
    fn test_drop_releases_vector() {
        let (sim, mut handle) = handle();
        sim.swap_vector(COM1_IRQ, Some(&PREVIOUS));
        handle.install().unwrap();
        handle.enable().unwrap();

        drop(handle);

        assert!(installed_is_previous(sim));
        assert!(sim.is_masked(COM1_IRQ));
    }
}
