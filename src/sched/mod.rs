//! Scheduler subsystem
//!
//! Per-CPU ready queues for a microkernel, ordered by virtual deadline
//! (weighted fair queuing). Each CPU picks the runnable scheduling context
//! with the earliest deadline; a periodic timeslice timeout replenishes the
//! running context, pushes its deadline forward and forces a reschedule.
//!
//! ## Per-CPU Architecture
//!
//! - Each CPU owns its ready queue and only touches it with interrupts masked
//! - Wakeups aimed at another CPU go through that CPU's mailbox plus an IPI
//! - A hotplug IPI tells the other CPUs that the online set changed
//! - Per-CPU statistics count ticks, switches and IPIs
//!
//! ## Module Organization
//!
//! - `types`: CPU ids, scheduling constants, nice/weight table
//! - `context`: Scheduling contexts, handles and the heap key
//! - `arena`: Generational storage backing the handles
//! - `policy`: Replenishment disciplines (weighted fair, fixed period)
//! - `ready_queue`: Binary min-heap of runnable contexts plus the idle slot
//! - `timeout`: Timeslice timeout driven by the timer tick
//! - `ipi`: Cross-CPU request mailboxes and IPI payloads
//! - `percpu`: Per-CPU slots and exclusive local access
//! - `stats`: Per-CPU counters
//! - `core`: The scheduler façade (tick, IPI, wake/block, hotplug)

mod arena;
mod context;
mod core;
mod error;
mod ipi;
pub mod percpu;
mod policy;
mod ready_queue;
mod stats;
mod timeout;
mod types;

// Re-export types for external use
pub use types::{CpuId, Reschedule, ThreadId};
pub use types::{DEFAULT_MAILBOX_DEPTH, DEFAULT_QUANTUM, MAX_CPUS, READY_QUEUE_CAPACITY};
pub use types::{NICE_0_WEIGHT, SCHED_GRANULARITY_NS, nice_to_weight};

pub use context::{Owner, SchedContext, SchedKey, ScId};
pub use error::SchedError;
pub use ipi::{IpiMessage, Mailbox, Request};
pub use percpu::{CpuSched, CpuSlot, LocalSched, PerCpu};
pub use policy::{calc_deadline_advance, Discipline, FixedPeriod, WeightedFair};
pub use ready_queue::{Next, ReadyQueue};
pub use stats::{CpuStats, CpuStatsSnapshot};
pub use timeout::{TimeoutState, TimesliceTimeout};

pub use self::core::{Scheduler, Switch};
