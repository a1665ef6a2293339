use core::marker::PhantomData;

use super::IrqControl;
use crate::sched::CpuId;

/// Interrupt-enable state saved by [`IrqControl::irq_save`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrqState {
    enabled: bool,
}

impl IrqState {
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub const fn was_enabled(self) -> bool {
        self.enabled
    }
}

/// Proof that local interrupts are masked on one particular CPU.
///
/// Every ready-queue mutator takes a `&IrqGuard`; the guard names the CPU
/// whose queue may be touched. Dropping it restores the interrupt state that
/// was in effect when it was created. The guard is neither `Send` nor `Sync`:
/// it is only meaningful on the CPU that created it.
pub struct IrqGuard<'a> {
    cpu: CpuId,
    saved: IrqState,
    irq: &'a dyn IrqControl,
    _cpu_bound: PhantomData<*const ()>,
}

impl<'a> IrqGuard<'a> {
    /// Mask interrupts through `irq` and bind the guard to `cpu`.
    ///
    /// `cpu` must be the CPU executing the caller.
    pub fn new(irq: &'a dyn IrqControl, cpu: CpuId) -> Self {
        let saved = irq.irq_save();
        debug_assert!(!irq.irqs_enabled());
        Self {
            cpu,
            saved,
            irq,
            _cpu_bound: PhantomData,
        }
    }

    #[inline]
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    /// Whether interrupts were enabled before this guard was taken.
    #[inline]
    pub fn saved(&self) -> IrqState {
        self.saved
    }
}

impl Drop for IrqGuard<'_> {
    fn drop(&mut self) {
        self.irq.irq_restore(self.saved);
    }
}
