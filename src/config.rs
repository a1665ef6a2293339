//! Scheduler configuration
//!
//! Built from compile-time defaults and optionally adjusted from the kernel
//! command line before the scheduler is constructed:
//!
//! ```text
//! sched_cpus=4 sched_granularity=1000000 sched_quantum=10 sched_weight=1024
//! sched_rq=512 loglevel=debug
//! ```

use crate::sched::{
    SchedError, DEFAULT_MAILBOX_DEPTH, DEFAULT_QUANTUM, MAX_CPUS, NICE_0_WEIGHT,
    READY_QUEUE_CAPACITY, SCHED_GRANULARITY_NS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedConfig {
    /// Number of CPU slots to provision.
    pub num_cpus: usize,
    /// Timer tick period in nanoseconds.
    pub granularity_ns: u64,
    /// Quantum handed to contexts created through the scheduler, in ticks.
    pub default_quantum: u64,
    /// Weight handed to contexts created through the scheduler.
    pub default_weight: u32,
    /// Runnable contexts per CPU before the kernel halts.
    pub rq_capacity: usize,
    /// Pending cross-CPU requests per CPU.
    pub mailbox_depth: usize,
}

impl SchedConfig {
    pub const fn new() -> Self {
        Self {
            num_cpus: 1,
            granularity_ns: SCHED_GRANULARITY_NS,
            default_quantum: DEFAULT_QUANTUM,
            default_weight: NICE_0_WEIGHT,
            rq_capacity: READY_QUEUE_CAPACITY,
            mailbox_depth: DEFAULT_MAILBOX_DEPTH,
        }
    }

    pub const fn with_cpus(mut self, num_cpus: usize) -> Self {
        self.num_cpus = num_cpus;
        self
    }

    pub const fn with_rq_capacity(mut self, rq_capacity: usize) -> Self {
        self.rq_capacity = rq_capacity;
        self
    }

    pub fn validate(&self) -> Result<(), SchedError> {
        if self.num_cpus == 0 || self.num_cpus > MAX_CPUS {
            return Err(SchedError::InvalidConfig("cpu count out of range"));
        }
        if self.rq_capacity == 0 || self.rq_capacity > READY_QUEUE_CAPACITY {
            return Err(SchedError::InvalidConfig("ready queue capacity out of range"));
        }
        if self.granularity_ns == 0 {
            return Err(SchedError::InvalidConfig("zero tick granularity"));
        }
        if self.default_quantum == 0 {
            return Err(SchedError::InvalidConfig("zero quantum"));
        }
        if self.default_weight == 0 {
            return Err(SchedError::InvalidConfig("zero weight"));
        }
        if self.mailbox_depth == 0 {
            return Err(SchedError::InvalidConfig("zero mailbox depth"));
        }
        Ok(())
    }

    /// Apply `sched_*=` tokens from a kernel command line.
    ///
    /// Unknown tokens are ignored; malformed values are rejected without
    /// touching the configuration.
    pub fn apply_cmdline(&mut self, cmdline: &str) -> Result<(), SchedError> {
        let mut next = *self;
        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key {
                "sched_cpus" => next.num_cpus = parse_num(value)? as usize,
                "sched_granularity" => next.granularity_ns = parse_num(value)?,
                "sched_quantum" => next.default_quantum = parse_num(value)?,
                "sched_weight" => {
                    next.default_weight = u32::try_from(parse_num(value)?)
                        .map_err(|_| SchedError::InvalidConfig("weight out of range"))?
                }
                "sched_rq" => next.rq_capacity = parse_num(value)? as usize,
                "sched_mailbox" => next.mailbox_depth = parse_num(value)? as usize,
                _ => {}
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Convert a tick count into nanoseconds.
    #[inline]
    pub const fn ticks_to_ns(&self, ticks: u64) -> u64 {
        ticks.saturating_mul(self.granularity_ns)
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_num(value: &str) -> Result<u64, SchedError> {
    value
        .parse::<u64>()
        .map_err(|_| SchedError::InvalidConfig("malformed numeric value"))
}
