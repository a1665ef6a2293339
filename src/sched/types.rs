//! Scheduler type definitions
//!
//! Identifiers, scheduling constants and the nice/weight table shared by the
//! ready queue, the timeslice timeout and the scheduler façade.

use core::fmt;

/// Maximum number of CPUs the scheduler can manage.
pub const MAX_CPUS: usize = 64;

/// Hard upper bound on simultaneously runnable contexts per CPU.
pub const READY_QUEUE_CAPACITY: usize = 1024;

/// Default timer tick period (1ms).
pub const SCHED_GRANULARITY_NS: u64 = 1_000_000;

/// Default quantum, in ticks.
pub const DEFAULT_QUANTUM: u64 = 10;

/// Weight of a nice-0 context; deadlines advance by exactly one quantum.
pub const NICE_0_WEIGHT: u32 = 1024;

/// Default depth of each per-CPU cross-CPU request mailbox.
pub const DEFAULT_MAILBOX_DEPTH: usize = 256;

/// Linux-compatible nice-to-weight table (nice -20..=19).
/// Each step is roughly a 1.25x change in CPU share.
const NICE_TO_WEIGHT: [u32; 40] = [
    // -20 to -11
    88761, 71755, 56483, 46273, 36291, 29154, 23254, 18705, 14949, 11916,
    // -10 to -1
    9548, 7620, 6100, 4904, 3906, 3121, 2501, 1991, 1586, 1277,
    // 0 to 9
    1024, 820, 655, 526, 423, 335, 272, 215, 172, 137,
    // 10 to 19
    110, 87, 70, 56, 45, 36, 29, 23, 18, 15,
];

/// Map a nice value to a scheduling weight. Out-of-range values clamp.
#[inline]
pub const fn nice_to_weight(nice: i8) -> u32 {
    let idx = nice as i32 + 20;
    let idx = if idx < 0 { 0 } else if idx > 39 { 39 } else { idx as usize };
    NICE_TO_WEIGHT[idx]
}

/// Index of a CPU as seen by the scheduler (0 is the boot CPU).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuId(pub u16);

impl CpuId {
    pub const BOOT: CpuId = CpuId(0);

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// Identifier of the thread owning a scheduling context.
pub type ThreadId = u64;

/// Outcome of a timeslice expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reschedule {
    /// The caller must re-run the selection before returning from the IRQ.
    Force,
    None,
}

impl Reschedule {
    #[inline]
    pub fn is_forced(self) -> bool {
        self == Reschedule::Force
    }
}
