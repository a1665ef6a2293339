//! Scheduling contexts
//!
//! A [`SchedContext`] says how much CPU time its owner is entitled to
//! (`weight`, `quantum`) and how soon (`deadline`). The ready queue orders
//! contexts by [`SchedContext::key`]: virtual deadline first, then the
//! admission sequence number, so contexts with equal deadlines run in the
//! order they became ready.

use core::fmt;

use super::types::{nice_to_weight, ThreadId, DEFAULT_QUANTUM, NICE_0_WEIGHT};

/// Generational handle to a context bound to one CPU's ready queue.
///
/// Handles of detached contexts never resolve again, even when their slot
/// is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ScId {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ScId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sc{}.{}", self.index, self.generation)
    }
}

/// What a scheduling context is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    Thread(ThreadId),
}

/// Heap ordering key. Smaller runs sooner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchedKey {
    pub deadline: u64,
    pub seq: u64,
}

/// The schedulable unit bound to a thread.
#[derive(Clone, Debug)]
pub struct SchedContext {
    owner: Owner,
    weight: u32,
    quantum: u64,
    left: u64,
    deadline: u64,
    seq: u64,
    /// Slot in the ready-queue heap; `Some` iff enqueued.
    pub(crate) ready_link: Option<usize>,
}

impl SchedContext {
    pub fn new(owner: Owner, weight: u32, quantum: u64) -> Self {
        debug_assert!(weight > 0, "zero weight scheduling context");
        debug_assert!(quantum > 0, "zero quantum scheduling context");
        Self {
            owner,
            weight: weight.max(1),
            quantum: quantum.max(1),
            left: quantum.max(1),
            deadline: 0,
            seq: 0,
            ready_link: None,
        }
    }

    /// Nice-0 weight and the default quantum.
    pub fn for_thread(tid: ThreadId) -> Self {
        Self::new(Owner::Thread(tid), NICE_0_WEIGHT, DEFAULT_QUANTUM)
    }

    pub fn with_nice(owner: Owner, nice: i8, quantum: u64) -> Self {
        Self::new(owner, nice_to_weight(nice), quantum)
    }

    /// Start at `deadline` instead of 0, e.g. the queue's current minimum.
    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = deadline;
        self
    }

    #[inline]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    #[inline]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: u32) {
        self.weight = weight.max(1);
    }

    #[inline]
    pub fn quantum(&self) -> u64 {
        self.quantum
    }

    /// Remaining budget in the current round, in ticks.
    #[inline]
    pub fn left(&self) -> u64 {
        self.left
    }

    #[inline]
    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn key(&self) -> SchedKey {
        SchedKey {
            deadline: self.deadline,
            seq: self.seq,
        }
    }

    /// O(1) membership test.
    #[inline]
    pub fn is_enqueued(&self) -> bool {
        self.ready_link.is_some()
    }

    /// Start a new round: refill the budget and move the deadline forward
    /// by `advance`. Deadlines never go backwards.
    pub(crate) fn advance_deadline(&mut self, advance: u64) {
        self.deadline = self.deadline.saturating_add(advance);
        self.left = self.quantum;
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    /// Deadlines only move forward; the heap relies on it when requeueing.
    pub(crate) fn raise_deadline(&mut self, deadline: u64) {
        debug_assert!(deadline >= self.deadline, "deadline moved backwards");
        self.deadline = self.deadline.max(deadline);
    }
}
