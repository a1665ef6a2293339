//! Timeslice timeout
//!
//! One per online CPU, installed at bring-up and driven by the periodic
//! timer tick. On expiry the context currently executing on the CPU is
//! replenished and requeued, and the current slot is invalidated so the
//! following reschedule re-derives the winner from the heap.
//!
//! The timeout never switches contexts itself; the scheduler façade does
//! that right after, on the same interrupt-return path.

use super::policy::Discipline;
use super::ready_queue::ReadyQueue;
use super::types::{CpuId, Reschedule};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutState {
    Armed,
    Expired,
    /// CPU went offline.
    Disarmed,
}

pub struct TimesliceTimeout {
    cpu: CpuId,
    state: TimeoutState,
    expirations: u64,
}

impl TimesliceTimeout {
    pub fn new(cpu: CpuId) -> Self {
        Self {
            cpu,
            state: TimeoutState::Armed,
            expirations: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> TimeoutState {
        self.state
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.state == TimeoutState::Armed
    }

    #[inline]
    pub fn expirations(&self) -> u64 {
        self.expirations
    }

    pub fn arm(&mut self) {
        self.state = TimeoutState::Armed;
    }

    pub fn disarm(&mut self) {
        self.state = TimeoutState::Disarmed;
    }

    /// Timer fired on this CPU.
    ///
    /// Performs exactly one replenish + requeue of the current context (if
    /// any) and always asks for a reschedule. A disarmed timeout ignores the
    /// tick.
    pub fn expired(&mut self, rq: &mut ReadyQueue, discipline: &dyn Discipline) -> Reschedule {
        if self.state == TimeoutState::Disarmed {
            return Reschedule::None;
        }
        debug_assert_eq!(self.state, TimeoutState::Armed);
        debug_assert_eq!(rq.cpu(), self.cpu);

        self.state = TimeoutState::Expired;
        self.expirations += 1;
        crate::ktrace!(
            "{}: timeslice expired (#{}, current {:?})",
            self.cpu,
            self.expirations,
            rq.current_sched()
        );

        if let Some(current) = rq.current_sched() {
            rq.replenish(current, discipline);
            rq.invalidate_sched();
        }

        self.state = TimeoutState::Armed;
        Reschedule::Force
    }
}
