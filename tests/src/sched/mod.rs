//! Scheduler Test Suite
//!
//! - `ready_queue`: heap operations, idle handling, capacity
//! - `context`: scheduling contexts, handles, weights
//! - `policy`: replenishment disciplines
//! - `timeout`: timeslice expiry
//! - `facade`: the per-CPU scheduler (tick, wake/block, IPIs, hotplug)

mod facade;

use fiasco_sched::sched::{CpuId, Next, ReadyQueue, SchedContext, ScId, READY_QUEUE_CAPACITY};

/// Full-size queue for the boot CPU.
pub(crate) fn make_rq() -> ReadyQueue {
    ReadyQueue::new(CpuId::BOOT, READY_QUEUE_CAPACITY)
}

/// Attach a nice-0 context for `tid` starting at `deadline`.
pub(crate) fn attach_at(rq: &mut ReadyQueue, tid: u64, deadline: u64) -> ScId {
    rq.attach(SchedContext::for_thread(tid).with_deadline(deadline))
}

pub(crate) fn deadline_of(rq: &ReadyQueue, next: Next) -> Option<u64> {
    next.sc().and_then(|id| rq.get(id)).map(|sc| sc.deadline())
}

/// Deadline of whatever the queue would run next.
pub(crate) fn peek_deadline(rq: &mut ReadyQueue) -> Option<u64> {
    let next = rq.next_to_run();
    deadline_of(rq, next)
}

/// Deterministic pseudo-random numbers for the randomized sequences.
pub(crate) struct Lcg(u64);

impl Lcg {
    pub(crate) fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub(crate) fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub(crate) fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}
