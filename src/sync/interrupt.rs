//! Interrupt controller abstraction.

/// A trait for controlling CPU interrupts and the platform interrupt controller.
///
/// This trait abstracts over the hardware-specific details of enabling and
/// disabling interrupts, masking individual IRQ lines and acknowledging them.
pub trait InterruptController {
    /// Disables interrupts and returns whether they were enabled before.
    fn disable_interrupts(&self) -> bool;

    /// Re-enables interrupts if `was_enabled` is true.
    fn restore_interrupts(&self, was_enabled: bool);

    /// Masks an IRQ line at the interrupt controller.
    fn mask_irq(&self, irq: u8);

    /// Unmasks an IRQ line at the interrupt controller.
    fn unmask_irq(&self, irq: u8);

    /// Signals end-of-interrupt for an IRQ line.
    fn end_of_interrupt(&self, irq: u8);
}

/// Scoped interrupt-disable.
///
/// Interrupts are disabled when the guard is created and restored to their
/// previous state when it is dropped, on every exit path. Nesting is safe:
/// an inner guard created while interrupts are already off restores nothing.
#[must_use = "interrupts are re-enabled as soon as the guard is dropped"]
pub struct CriticalSection<'a, C: InterruptController + ?Sized> {
    controller: &'a C,
    was_enabled: bool,
}

impl<'a, C: InterruptController + ?Sized> CriticalSection<'a, C> {
    /// Disable interrupts until the returned guard is dropped.
    pub fn enter(controller: &'a C) -> Self {
        let was_enabled = controller.disable_interrupts();
        Self {
            controller,
            was_enabled,
        }
    }
}

impl<C: InterruptController + ?Sized> Drop for CriticalSection<'_, C> {
    fn drop(&mut self) {
        self.controller.restore_interrupts(self.was_enabled);
    }
}

/// Run `f` with interrupts disabled.
pub fn without_interrupts<C, F, R>(controller: &C, f: F) -> R
where
    C: InterruptController + ?Sized,
    F: FnOnce() -> R,
{
    let _guard = CriticalSection::enter(controller);
    f()
}
