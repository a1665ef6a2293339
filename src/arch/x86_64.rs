//! x86_64 interrupt-flag helpers
//!
//! These execute `cli`/`sti` and read RFLAGS, so they only work in ring 0.
//! A kernel's [`IrqControl`](super::IrqControl) implementation is usually a
//! thin wrapper around [`NativeIrq`].

use ::x86_64::instructions::interrupts;

use super::{IrqControl, IrqState};

/// Interrupt control backed by the RFLAGS.IF bit of the executing CPU.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeIrq;

impl IrqControl for NativeIrq {
    #[inline]
    fn irq_save(&self) -> IrqState {
        let enabled = interrupts::are_enabled();
        if enabled {
            interrupts::disable();
        }
        IrqState::new(enabled)
    }

    #[inline]
    fn irq_restore(&self, state: IrqState) {
        if state.was_enabled() {
            interrupts::enable();
        }
    }

    #[inline]
    fn irqs_enabled(&self) -> bool {
        interrupts::are_enabled()
    }
}

/// Run `f` with interrupts masked, restoring the previous state afterwards.
#[inline]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    interrupts::without_interrupts(f)
}
