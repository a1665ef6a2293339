//! Per-CPU scheduler statistics
//!
//! Plain relaxed atomics: they are bumped by the owning CPU and may be read
//! from any CPU without touching the ready queue.

use core::sync::atomic::{AtomicU64, Ordering};

pub struct CpuStats {
    pub ticks: AtomicU64,
    pub context_switches: AtomicU64,
    pub preemptions: AtomicU64,
    pub voluntary_switches: AtomicU64,
    pub idle_switches: AtomicU64,
    pub ipis_sent: AtomicU64,
    pub ipis_received: AtomicU64,
    pub remote_wakeups: AtomicU64,
    /// Platform tick of the most recent context switch.
    pub last_switch_tick: AtomicU64,
}

/// Point-in-time copy of [`CpuStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuStatsSnapshot {
    pub ticks: u64,
    pub context_switches: u64,
    pub preemptions: u64,
    pub voluntary_switches: u64,
    pub idle_switches: u64,
    pub ipis_sent: u64,
    pub ipis_received: u64,
    pub remote_wakeups: u64,
    pub last_switch_tick: u64,
}

impl CpuStats {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            context_switches: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            voluntary_switches: AtomicU64::new(0),
            idle_switches: AtomicU64::new(0),
            ipis_sent: AtomicU64::new(0),
            ipis_received: AtomicU64::new(0),
            remote_wakeups: AtomicU64::new(0),
            last_switch_tick: AtomicU64::new(0),
        }
    }

    /// Record a context switch made at platform tick `now`
    pub fn record_switch(&self, now: u64, preempted: bool, to_idle: bool) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
        self.last_switch_tick.store(now, Ordering::Relaxed);
        if preempted {
            self.preemptions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.voluntary_switches.fetch_add(1, Ordering::Relaxed);
        }
        if to_idle {
            self.idle_switches.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CpuStatsSnapshot {
        CpuStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            context_switches: self.context_switches.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            voluntary_switches: self.voluntary_switches.load(Ordering::Relaxed),
            idle_switches: self.idle_switches.load(Ordering::Relaxed),
            ipis_sent: self.ipis_sent.load(Ordering::Relaxed),
            ipis_received: self.ipis_received.load(Ordering::Relaxed),
            remote_wakeups: self.remote_wakeups.load(Ordering::Relaxed),
            last_switch_tick: self.last_switch_tick.load(Ordering::Relaxed),
        }
    }
}

impl Default for CpuStats {
    fn default() -> Self {
        Self::new()
    }
}
