//! Platform boundary for the scheduler
//!
//! The scheduler never touches hardware directly. Everything it needs from
//! the rest of the kernel goes through the [`Platform`] trait:
//! - the current CPU id and a monotonic tick source
//! - local interrupt masking (see [`IrqGuard`])
//! - the IPI facility for cross-CPU notifications
//! - the architecture context-switch primitive
//!
//! `x86_64` carries the native interrupt helpers a bare-metal implementation
//! of [`IrqControl`] is built from.

mod irq;
#[cfg(target_arch = "x86_64")]
pub mod x86_64;

pub use irq::{IrqGuard, IrqState};

use crate::sched::{CpuId, IpiMessage, Next};

/// Local interrupt masking on the calling CPU.
pub trait IrqControl {
    /// Disable interrupts on the calling CPU, returning the previous state.
    fn irq_save(&self) -> IrqState;

    /// Restore a state previously returned by [`IrqControl::irq_save`].
    fn irq_restore(&self, state: IrqState);

    fn irqs_enabled(&self) -> bool;
}

/// Everything the scheduler consumes from the surrounding kernel.
pub trait Platform: IrqControl + Sync {
    /// Index of the CPU executing the caller.
    fn current_cpu(&self) -> CpuId;

    /// Monotonic tick counter. Context switches are stamped with it in the
    /// per-CPU statistics.
    fn now(&self) -> u64;

    /// Deliver `msg` to `to`. Must be callable with interrupts masked.
    fn send_ipi(&self, msg: IpiMessage, from: CpuId, to: CpuId);

    /// Deliver `msg` to every online CPU except `from`.
    fn broadcast_ipi(&self, msg: IpiMessage, from: CpuId);

    /// Switch the register/stack/address-space state of `cpu` from `from` to
    /// `to`. Called with interrupts masked; must not re-enable them before
    /// the switch completes.
    fn switch_to(&self, cpu: CpuId, from: Next, to: Next);
}
