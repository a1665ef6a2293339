//! Scheduler façade
//!
//! Glue between timer/IPI events and the per-CPU ready queues:
//! - timer tick: timeslice timeout, then reschedule
//! - block/wake from IPC: direct enqueue/dequeue on the local CPU, or a
//!   mailbox request plus IPI when the context lives on another CPU
//! - CPU bring-up/tear-down and the hotplug notification
//!
//! Every operation that touches a ready queue takes an [`IrqGuard`] and acts
//! on the guard's CPU only.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::{IrqGuard, Platform};
use crate::config::SchedConfig;

use super::context::{Owner, SchedContext, ScId};
use super::error::SchedError;
use super::ipi::{IpiMessage, Request};
use super::percpu::{CpuSched, CpuSlot, LocalSched, PerCpu};
use super::policy::{Discipline, WeightedFair};
use super::ready_queue::{Next, ReadyQueue};
use super::stats::{CpuStats, CpuStatsSnapshot};
use super::types::{CpuId, ThreadId, MAX_CPUS};

/// A context switch performed by [`Scheduler::schedule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Switch {
    pub cpu: CpuId,
    pub from: Next,
    pub to: Next,
}

pub struct Scheduler<P: Platform, D: Discipline = WeightedFair> {
    platform: P,
    discipline: D,
    config: SchedConfig,
    cpus: PerCpu<CpuSlot>,
    online: AtomicU64,
}

impl<P: Platform> Scheduler<P, WeightedFair> {
    /// Weighted fair queuing scheduler.
    pub fn new(platform: P, config: SchedConfig) -> Result<Self, SchedError> {
        Self::with_discipline(platform, config, WeightedFair)
    }
}

impl<P: Platform, D: Discipline> Scheduler<P, D> {
    pub fn with_discipline(
        platform: P,
        config: SchedConfig,
        discipline: D,
    ) -> Result<Self, SchedError> {
        config.validate()?;
        debug_assert!(config.num_cpus <= MAX_CPUS);

        let cpus = PerCpu::new(config.num_cpus, |_| CpuSlot::new(config.mailbox_depth));
        crate::kinfo!(
            "scheduler initialized ({} cpus, {} slots/cpu, {}ns tick, {})",
            config.num_cpus,
            config.rq_capacity,
            config.granularity_ns,
            discipline.name()
        );

        Ok(Self {
            platform,
            discipline,
            config,
            cpus,
            online: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn discipline(&self) -> &D {
        &self.discipline
    }

    #[inline]
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Mask interrupts on the calling CPU for the lifetime of the guard.
    pub fn mask_interrupts(&self) -> IrqGuard<'_> {
        IrqGuard::new(&self.platform, self.platform.current_cpu())
    }

    // ========================================================================
    // CPU bring-up and hotplug
    // ========================================================================

    /// Install the ready queue and timeslice timeout of `cpu` and mark it
    /// online. The boot CPU must come first.
    pub fn bring_up_cpu(&self, cpu: CpuId) -> Result<(), SchedError> {
        let slot = self.slot(cpu)?;
        if cpu != CpuId::BOOT && !self.is_online(CpuId::BOOT) {
            crate::kerror!("{} brought up before the boot cpu", cpu);
            return Err(SchedError::BootOrder(cpu));
        }
        if self.is_online(cpu) {
            return Err(SchedError::AlreadyOnline(cpu));
        }

        if !slot.install(CpuSched::new(cpu, self.config.rq_capacity)) {
            // Coming back after a tear-down: keep the queue, re-arm the tick.
            if let Some(mut sched) = slot.local() {
                sched.timeout.arm();
                sched.need_resched = true;
            }
        }

        let bit: u64 = 1 << cpu.index();
        let mask = self.online.fetch_or(bit, Ordering::AcqRel) | bit;
        if let Some(mut sched) = slot.local() {
            sched.online_seen = mask;
        }
        crate::kinfo!("{}: scheduler online ({} cpus online)", cpu, self.online_cpus());

        if cpu != CpuId::BOOT {
            self.trigger_hotplug_event(None);
        }
        Ok(())
    }

    /// Take the calling CPU offline. Its timeslice timeout is disarmed;
    /// contexts still bound to it stay where they are.
    pub fn take_down_cpu(&self, guard: &IrqGuard<'_>) -> Result<(), SchedError> {
        let cpu = guard.cpu();
        if cpu == CpuId::BOOT {
            return Err(SchedError::BootCpuOffline);
        }
        if !self.is_online(cpu) {
            return Err(SchedError::NotOnline(cpu));
        }

        {
            let mut sched = self.local(guard)?;
            sched.timeout.disarm();
            if !sched.rq.is_empty() {
                crate::kwarn!(
                    "{}: going offline with {} runnable contexts",
                    cpu,
                    sched.rq.len()
                );
            }
        }

        self.online.fetch_and(!(1 << cpu.index()), Ordering::AcqRel);
        crate::kinfo!("{}: scheduler offline", cpu);
        self.trigger_hotplug_event(None);
        Ok(())
    }

    /// Tell one CPU, or every other online CPU, that the online set changed.
    pub fn trigger_hotplug_event(&self, target: Option<CpuId>) {
        let from = self.platform.current_cpu();
        match target {
            Some(to) => {
                self.platform.send_ipi(IpiMessage::Hotplug, from, to);
                self.bump(from, |s| &s.ipis_sent);
            }
            None => {
                self.platform.broadcast_ipi(IpiMessage::Hotplug, from);
                self.bump(from, |s| &s.ipis_sent);
            }
        }
        crate::kdebug!(
            "{}: hotplug event sent (online mask {:#x})",
            from,
            self.online_mask()
        );
    }

    #[inline]
    pub fn is_online(&self, cpu: CpuId) -> bool {
        cpu.index() < MAX_CPUS && self.online.load(Ordering::Acquire) & (1 << cpu.index()) != 0
    }

    #[inline]
    pub fn online_mask(&self) -> u64 {
        self.online.load(Ordering::Acquire)
    }

    #[inline]
    pub fn online_cpus(&self) -> usize {
        self.online_mask().count_ones() as usize
    }

    pub fn stats(&self, cpu: CpuId) -> Option<CpuStatsSnapshot> {
        self.cpus.get(cpu).map(|slot| slot.stats.snapshot())
    }

    // ========================================================================
    // Binding contexts to CPUs
    // ========================================================================

    /// Bind an existing context to the guard's CPU.
    pub fn attach(&self, guard: &IrqGuard<'_>, sc: SchedContext) -> Result<ScId, SchedError> {
        let mut sched = self.local(guard)?;
        Ok(sched.rq.attach(sc))
    }

    /// Create a context for `tid` on the guard's CPU with the configured
    /// weight and quantum, starting at the CPU's current virtual time so it
    /// neither starves nor is starved by the contexts already there.
    pub fn create(&self, guard: &IrqGuard<'_>, tid: ThreadId) -> Result<ScId, SchedError> {
        let mut sched = self.local(guard)?;
        let vtime = Self::virtual_time(&sched);
        let sc = SchedContext::new(
            Owner::Thread(tid),
            self.config.default_weight,
            self.config.default_quantum,
        )
        .with_deadline(vtime);
        Ok(sched.rq.attach(sc))
    }

    /// Unbind a context from the guard's CPU (thread exit or migration).
    pub fn detach(&self, guard: &IrqGuard<'_>, id: ScId) -> Result<SchedContext, SchedError> {
        let mut sched = self.local(guard)?;
        let sc = sched.rq.detach(id).ok_or(SchedError::UnknownContext)?;
        if sched.running == Next::Runnable(id) {
            sched.need_resched = true;
        }
        Ok(sc)
    }

    // ========================================================================
    // Ready-queue operations on the local CPU
    // ========================================================================

    pub fn enqueue(&self, guard: &IrqGuard<'_>, id: ScId) -> Result<bool, SchedError> {
        Ok(self.local(guard)?.rq.enqueue(id))
    }

    pub fn dequeue(&self, guard: &IrqGuard<'_>, id: ScId) -> Result<bool, SchedError> {
        Ok(self.local(guard)?.rq.dequeue(id))
    }

    pub fn requeue(&self, guard: &IrqGuard<'_>, id: ScId) -> Result<(), SchedError> {
        self.local(guard)?.rq.requeue(id);
        Ok(())
    }

    pub fn next_to_run(&self, guard: &IrqGuard<'_>) -> Result<Next, SchedError> {
        Ok(self.local(guard)?.rq.next_to_run())
    }

    pub fn activate(&self, guard: &IrqGuard<'_>, next: Next) -> Result<(), SchedError> {
        self.local(guard)?.rq.activate(next);
        Ok(())
    }

    /// Run `f` against the guard's ready queue.
    pub fn with_ready_queue<R>(
        &self,
        guard: &IrqGuard<'_>,
        f: impl FnOnce(&mut ReadyQueue) -> R,
    ) -> Result<R, SchedError> {
        let mut sched = self.local(guard)?;
        Ok(f(&mut sched.rq))
    }

    /// What the guard's CPU is executing.
    pub fn running(&self, guard: &IrqGuard<'_>) -> Result<Next, SchedError> {
        Ok(self.local(guard)?.running)
    }

    /// The online mask as the guard's CPU last observed it. This only moves
    /// at bring-up and on a hotplug IPI, unlike [`online_mask`](Self::online_mask).
    pub fn online_seen(&self, guard: &IrqGuard<'_>) -> Result<u64, SchedError> {
        Ok(self.local(guard)?.online_seen)
    }

    // ========================================================================
    // Blocking and waking
    // ========================================================================

    /// Make `id`, bound to `cpu`, runnable.
    ///
    /// Local wakeups go straight into the ready queue. Remote ones are
    /// posted to `cpu`'s mailbox followed by a reschedule IPI; the remote
    /// queue is never touched from here.
    pub fn wake(&self, guard: &IrqGuard<'_>, cpu: CpuId, id: ScId) -> Result<(), SchedError> {
        if cpu == guard.cpu() {
            let mut sched = self.local(guard)?;
            return Self::wake_local(&mut sched, id);
        }
        self.post_remote(guard, cpu, Request::Wake(id))?;
        self.bump(guard.cpu(), |s| &s.remote_wakeups);
        Ok(())
    }

    /// Take `id`, bound to `cpu`, off its ready queue.
    pub fn block(&self, guard: &IrqGuard<'_>, cpu: CpuId, id: ScId) -> Result<(), SchedError> {
        if cpu == guard.cpu() {
            let mut sched = self.local(guard)?;
            return Self::block_local(&mut sched, id);
        }
        self.post_remote(guard, cpu, Request::Block(id))
    }

    fn post_remote(&self, guard: &IrqGuard<'_>, cpu: CpuId, request: Request) -> Result<(), SchedError> {
        let slot = self.slot(cpu)?;
        if !self.is_online(cpu) {
            return Err(SchedError::NotOnline(cpu));
        }
        slot.mailbox.post(request)?;
        self.platform.send_ipi(IpiMessage::Reschedule, guard.cpu(), cpu);
        self.bump(guard.cpu(), |s| &s.ipis_sent);
        crate::ktrace!("{}: posted {:?} to {}", guard.cpu(), request, cpu);
        Ok(())
    }

    fn wake_local(sched: &mut CpuSched, id: ScId) -> Result<(), SchedError> {
        if sched.rq.get(id).is_none() {
            crate::kdebug!("{}: wake of unknown {}", sched.rq.cpu(), id);
            return Err(SchedError::UnknownContext);
        }
        if sched.rq.contains(id) {
            return Ok(());
        }

        // A context that slept for a long time comes back at the current
        // virtual time rather than with an ancient deadline.
        let vtime = Self::virtual_time(sched);
        if sched.rq.get(id).map(|sc| sc.deadline() < vtime).unwrap_or(false) {
            sched.rq.postpone(id, vtime);
        } else {
            sched.rq.enqueue(id);
        }

        let running = sched.running;
        let preempt = match (sched.rq.key_of(Next::Runnable(id)), sched.rq.key_of(running)) {
            _ if running.is_idle() => true,
            (Some(woken), Some(current)) => woken < current,
            _ => true,
        };
        if preempt {
            sched.need_resched = true;
        }
        Ok(())
    }

    fn block_local(sched: &mut CpuSched, id: ScId) -> Result<(), SchedError> {
        if sched.rq.get(id).is_none() {
            return Err(SchedError::UnknownContext);
        }
        sched.rq.dequeue(id);
        if sched.rq.current_sched() == Some(id) {
            // Blocked contexts must not be requeued by the next tick.
            sched.rq.invalidate_sched();
        }
        if sched.running == Next::Runnable(id) {
            sched.need_resched = true;
        }
        Ok(())
    }

    /// Deadline the CPU's virtual clock stands at: the running context's,
    /// or the idle deadline when idle.
    fn virtual_time(sched: &CpuSched) -> u64 {
        sched
            .rq
            .key_of(sched.running)
            .map(|key| key.deadline)
            .unwrap_or_else(|| sched.rq.idle_deadline())
    }

    // ========================================================================
    // Interrupt entry points
    // ========================================================================

    /// Periodic timer tick on the guard's CPU.
    ///
    /// Expires the timeslice timeout (replenish + requeue of the current
    /// context) and reschedules. Returns the switch, if one happened.
    pub fn timer_interrupt(&self, guard: &IrqGuard<'_>) -> Result<Option<Switch>, SchedError> {
        let cpu = guard.cpu();
        let slot = self.slot(cpu)?;
        let mut sched = self.local(guard)?;
        CpuStats::bump(&slot.stats.ticks);

        let sched = &mut *sched;
        let decision = sched.timeout.expired(&mut sched.rq, &self.discipline);
        if !decision.is_forced() && !sched.need_resched {
            return Ok(None);
        }
        Ok(self.schedule_locked(cpu, slot, sched))
    }

    /// IPI received on the guard's CPU: run pending mailbox requests, then
    /// reschedule if any of them asked for it.
    ///
    /// A hotplug IPI refreshes this CPU's copy of the online mask and forces
    /// a reschedule. Nothing is migrated here; moving contexts between CPUs
    /// is left to the layer above.
    pub fn handle_ipi(&self, guard: &IrqGuard<'_>, msg: IpiMessage) -> Result<Option<Switch>, SchedError> {
        let cpu = guard.cpu();
        let slot = self.slot(cpu)?;
        let mut sched = self.local(guard)?;
        CpuStats::bump(&slot.stats.ipis_received);

        if msg == IpiMessage::Hotplug {
            let mask = self.online_mask();
            crate::kdebug!(
                "{}: hotplug notification, online mask {:#x} -> {:#x}",
                cpu,
                sched.online_seen,
                mask
            );
            sched.online_seen = mask;
            sched.need_resched = true;
        }

        while let Some(request) = slot.mailbox.pop() {
            let result = match request {
                Request::Wake(id) => Self::wake_local(&mut sched, id),
                Request::Block(id) => Self::block_local(&mut sched, id),
            };
            if let Err(err) = result {
                crate::kdebug!("{}: dropped {:?}: {}", cpu, request, err);
            }
        }

        if !sched.need_resched {
            return Ok(None);
        }
        Ok(self.schedule_locked(cpu, slot, &mut sched))
    }

    /// Pick the next context for the guard's CPU and switch to it if it is
    /// not what the CPU runs already.
    pub fn schedule(&self, guard: &IrqGuard<'_>) -> Result<Option<Switch>, SchedError> {
        let cpu = guard.cpu();
        let slot = self.slot(cpu)?;
        let mut sched = self.local(guard)?;
        Ok(self.schedule_locked(cpu, slot, &mut sched))
    }

    fn schedule_locked(&self, cpu: CpuId, slot: &CpuSlot, sched: &mut CpuSched) -> Option<Switch> {
        sched.need_resched = false;
        let next = sched.rq.next_to_run();
        sched.rq.activate(next);

        let from = sched.running;
        if next == from {
            return None;
        }

        let preempted = from.sc().map(|id| sched.rq.contains(id)).unwrap_or(false);
        slot.stats
            .record_switch(self.platform.now(), preempted, next.is_idle());
        sched.running = next;

        crate::ktrace!("{}: switch {:?} -> {:?}", cpu, from, next);
        self.platform.switch_to(cpu, from, next);
        Some(Switch { cpu, from, to: next })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn slot(&self, cpu: CpuId) -> Result<&CpuSlot, SchedError> {
        self.cpus.get(cpu).ok_or(SchedError::InvalidCpu(cpu))
    }

    fn local(&self, guard: &IrqGuard<'_>) -> Result<LocalSched<'_>, SchedError> {
        let cpu = guard.cpu();
        debug_assert!(!self.platform.irqs_enabled(), "{}: ready queue touched with irqs on", cpu);
        debug_assert_eq!(cpu, self.platform.current_cpu(), "guard used on another cpu");
        self.slot(cpu)?.local().ok_or(SchedError::NotOnline(cpu))
    }

    fn bump(&self, cpu: CpuId, counter: impl FnOnce(&CpuStats) -> &AtomicU64) {
        if let Some(slot) = self.cpus.get(cpu) {
            CpuStats::bump(counter(&slot.stats));
        }
    }
}
