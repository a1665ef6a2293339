//! Per-CPU scheduler data
//!
//! Each CPU owns:
//! - its ready queue and timeslice timeout (`CpuSched`), installed at
//!   bring-up and only ever touched by that CPU with interrupts masked
//! - a request mailbox other CPUs post into before sending an IPI
//! - statistics counters, readable from anywhere
//!
//! Slots are cache-line aligned to prevent false sharing between CPUs.

extern crate alloc;

use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

use super::ipi::Mailbox;
use super::ready_queue::{Next, ReadyQueue};
use super::stats::CpuStats;
use super::timeout::TimesliceTimeout;
use super::types::CpuId;

/// A value per CPU, indexed by [`CpuId`].
pub struct PerCpu<T> {
    slots: Vec<CacheAligned<T>>,
}

#[repr(C, align(64))]
struct CacheAligned<T>(T);

impl<T> PerCpu<T> {
    pub fn new(count: usize, mut init: impl FnMut(CpuId) -> T) -> Self {
        let slots = (0..count)
            .map(|idx| CacheAligned(init(CpuId(idx as u16))))
            .collect();
        Self { slots }
    }

    #[inline]
    pub fn get(&self, cpu: CpuId) -> Option<&T> {
        self.slots.get(cpu.index()).map(|slot| &slot.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CpuId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| (CpuId(idx as u16), &slot.0))
    }
}

/// Scheduling state owned by one online CPU.
pub struct CpuSched {
    pub rq: ReadyQueue,
    pub timeout: TimesliceTimeout,
    /// What the CPU is executing right now (as last passed to `switch_to`).
    pub running: Next,
    /// Set when a local wakeup or IPI asks for re-evaluation.
    pub need_resched: bool,
    /// Online mask as of this CPU's bring-up or last hotplug IPI.
    pub online_seen: u64,
}

impl CpuSched {
    pub fn new(cpu: CpuId, rq_capacity: usize) -> Self {
        Self {
            rq: ReadyQueue::new(cpu, rq_capacity),
            timeout: TimesliceTimeout::new(cpu),
            running: Next::Idle,
            need_resched: false,
            online_seen: 0,
        }
    }
}

/// Everything the scheduler keeps for one CPU.
pub struct CpuSlot {
    sched: Mutex<Option<CpuSched>>,
    pub mailbox: Mailbox,
    pub stats: CpuStats,
}

impl CpuSlot {
    pub fn new(mailbox_depth: usize) -> Self {
        Self {
            sched: Mutex::new(None),
            mailbox: Mailbox::new(mailbox_depth),
            stats: CpuStats::new(),
        }
    }

    /// Install fresh state at bring-up. Returns false if already installed.
    pub(crate) fn install(&self, sched: CpuSched) -> bool {
        let mut slot = self.sched.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(sched);
        true
    }

    /// Exclusive access for the owning CPU.
    ///
    /// The lock is never contended in a correct kernel: only the owning CPU
    /// touches its slot, with interrupts masked. Contention therefore means
    /// another CPU reached in directly, which is a fatal bug.
    pub(crate) fn local(&self) -> Option<LocalSched<'_>> {
        let Some(guard) = self.sched.try_lock() else {
            crate::kfatal!("per-CPU scheduler state accessed concurrently");
            panic!("cross-CPU access to a local ready queue");
        };
        if guard.is_none() {
            return None;
        }
        Some(LocalSched { guard })
    }
}

/// Borrow of an installed [`CpuSched`].
pub struct LocalSched<'a> {
    guard: MutexGuard<'a, Option<CpuSched>>,
}

impl Deref for LocalSched<'_> {
    type Target = CpuSched;

    fn deref(&self) -> &CpuSched {
        match self.guard.as_ref() {
            Some(sched) => sched,
            None => unreachable!("LocalSched built over an empty slot"),
        }
    }
}

impl DerefMut for LocalSched<'_> {
    fn deref_mut(&mut self) -> &mut CpuSched {
        match self.guard.as_mut() {
            Some(sched) => sched,
            None => unreachable!("LocalSched built over an empty slot"),
        }
    }
}
