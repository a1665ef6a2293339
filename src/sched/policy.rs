//! Replenishment disciplines
//!
//! When a context has used up its timeslice it is replenished: its budget is
//! refilled and its virtual deadline pushed forward. How far forward is the
//! queueing discipline's business:
//!
//! - [`WeightedFair`]: `deadline += quantum * NICE_0_WEIGHT / weight`, so a
//!   context with twice the weight comes back twice as often.
//! - [`FixedPeriod`]: `deadline += period`, plain EDF-style periodic release.

use super::context::SchedContext;
use super::types::NICE_0_WEIGHT;

/// Computes how far a replenished context's deadline advances.
pub trait Discipline: Sync {
    /// Deadline increment for `sc`'s next round. Must be > 0.
    fn deadline_advance(&self, sc: &SchedContext) -> u64;

    /// Refill the budget and move the deadline forward.
    fn replenish(&self, sc: &mut SchedContext) {
        let advance = self.deadline_advance(sc).max(1);
        sc.advance_deadline(advance);
    }

    fn name(&self) -> &'static str;
}

/// Weighted fair queuing on virtual time.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedFair;

impl Discipline for WeightedFair {
    #[inline]
    fn deadline_advance(&self, sc: &SchedContext) -> u64 {
        calc_deadline_advance(sc.quantum(), sc.weight())
    }

    fn name(&self) -> &'static str {
        "wfq"
    }
}

/// Every context is released once per fixed period regardless of weight.
#[derive(Clone, Copy, Debug)]
pub struct FixedPeriod {
    pub period: u64,
}

impl FixedPeriod {
    pub const fn new(period: u64) -> Self {
        Self { period }
    }
}

impl Discipline for FixedPeriod {
    #[inline]
    fn deadline_advance(&self, _sc: &SchedContext) -> u64 {
        self.period
    }

    fn name(&self) -> &'static str {
        "edf"
    }
}

/// Virtual deadline increment: `quantum * NICE_0_WEIGHT / weight`.
#[inline(always)]
pub fn calc_deadline_advance(quantum: u64, weight: u32) -> u64 {
    if weight == 0 {
        return quantum;
    }
    // u128 so huge quanta with tiny weights cannot overflow mid-way
    let delta = (quantum as u128 * NICE_0_WEIGHT as u128) / weight as u128;
    delta.min(u64::MAX as u128) as u64
}
