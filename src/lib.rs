//! Per-CPU ready-queue scheduler for an L4-family microkernel.
//!
//! The crate is `no_std` and allocation-light: the only heap allocations
//! happen when a CPU is brought up or a context is attached. Hardware access
//! (interrupt masking, IPIs, the context-switch primitive) is supplied by the
//! embedding kernel through [`arch::Platform`].
//!
//! Entry points:
//! - [`Scheduler::timer_interrupt`]: periodic tick, timeslice expiry
//! - [`Scheduler::wake`] / [`Scheduler::block`]: IPC-driven state changes
//! - [`Scheduler::handle_ipi`]: cross-CPU requests and hotplug notifications
//! - [`Scheduler::bring_up_cpu`] / [`Scheduler::take_down_cpu`]: CPU hotplug

#![no_std]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod logger;
pub mod sched;
#[cfg(all(target_arch = "x86_64", target_os = "none", feature = "serial_log"))]
mod serial;

pub use config::SchedConfig;
pub use sched::{
    CpuId, Discipline, IpiMessage, Next, ReadyQueue, SchedContext, SchedError, ScId, Scheduler,
    Switch, WeightedFair,
};

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::FATAL, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::ERROR, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::INFO, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::DEBUG, $($arg)*);
    }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::TRACE, $($arg)*);
    }};
}
