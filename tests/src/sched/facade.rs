//! Scheduler Façade Tests
//!
//! Timer-driven switching, local and cross-CPU wake/block, IPI handling and
//! CPU hotplug, all against the mock platform.

use fiasco_sched::arch::IrqGuard;
use fiasco_sched::sched::{
    CpuId, Discipline, FixedPeriod, IpiMessage, Next, SchedContext, SchedError, Scheduler, ScId,
    Switch,
};
use fiasco_sched::SchedConfig;

use crate::mock::{Broadcast, MockPlatform, SentIpi, SwitchRecord};

fn make_sched(cpus: usize) -> Scheduler<MockPlatform> {
    let sched = Scheduler::new(MockPlatform::new(cpus), SchedConfig::new().with_cpus(cpus))
        .expect("valid config");
    for cpu in 0..cpus {
        sched.bring_up_cpu(CpuId(cpu as u16)).expect("bring-up");
    }
    sched.platform().set_cpu(CpuId::BOOT);
    sched.platform().clear();
    sched
}

/// Run `f` on `cpu` with interrupts masked.
fn on_cpu<D: Discipline, R>(
    sched: &Scheduler<MockPlatform, D>,
    cpu: CpuId,
    f: impl FnOnce(&IrqGuard<'_>) -> R,
) -> R {
    sched.platform().set_cpu(cpu);
    let guard = sched.mask_interrupts();
    f(&guard)
}

fn attach_at(sched: &Scheduler<MockPlatform>, cpu: CpuId, tid: u64, deadline: u64) -> ScId {
    on_cpu(sched, cpu, |g| {
        sched
            .attach(g, SchedContext::for_thread(tid).with_deadline(deadline))
            .expect("attach")
    })
}

fn deadline(sched: &Scheduler<MockPlatform>, cpu: CpuId, id: ScId) -> Option<u64> {
    on_cpu(sched, cpu, |g| {
        sched
            .with_ready_queue(g, |rq| rq.get(id).map(|sc| sc.deadline()))
            .expect("online cpu")
    })
}

// ============================================================================
// Construction and Bring-up
// ============================================================================

#[test]
fn test_invalid_config_rejected() {
    let result = Scheduler::new(MockPlatform::new(1), SchedConfig::new().with_cpus(0));
    assert!(matches!(result, Err(SchedError::InvalidConfig(_))));

    let result = Scheduler::new(
        MockPlatform::new(1),
        SchedConfig::new().with_rq_capacity(4096),
    );
    assert!(matches!(result, Err(SchedError::InvalidConfig(_))));
}

#[test]
fn test_boot_cpu_comes_first() {
    let sched = Scheduler::new(MockPlatform::new(2), SchedConfig::new().with_cpus(2)).unwrap();

    assert_eq!(
        sched.bring_up_cpu(CpuId(1)),
        Err(SchedError::BootOrder(CpuId(1)))
    );
    assert_eq!(sched.bring_up_cpu(CpuId::BOOT), Ok(()));
    assert_eq!(
        sched.bring_up_cpu(CpuId::BOOT),
        Err(SchedError::AlreadyOnline(CpuId::BOOT))
    );
    assert_eq!(sched.bring_up_cpu(CpuId(1)), Ok(()));
    assert_eq!(
        sched.bring_up_cpu(CpuId(5)),
        Err(SchedError::InvalidCpu(CpuId(5)))
    );

    assert_eq!(sched.online_cpus(), 2);
    assert_eq!(sched.online_mask(), 0b11);
}

#[test]
fn test_secondary_bring_up_broadcasts_hotplug() {
    let sched = Scheduler::new(MockPlatform::new(2), SchedConfig::new().with_cpus(2)).unwrap();

    sched.bring_up_cpu(CpuId::BOOT).unwrap();
    assert!(sched.platform().broadcasts().is_empty());

    sched.bring_up_cpu(CpuId(1)).unwrap();
    assert_eq!(
        sched.platform().broadcasts(),
        vec![Broadcast {
            msg: IpiMessage::Hotplug,
            from: CpuId::BOOT
        }]
    );
}

#[test]
fn test_offline_cpu_queue_unavailable() {
    let sched = Scheduler::new(MockPlatform::new(2), SchedConfig::new().with_cpus(2)).unwrap();
    sched.bring_up_cpu(CpuId::BOOT).unwrap();

    let result = on_cpu(&sched, CpuId(1), |g| {
        sched.attach(g, SchedContext::for_thread(1))
    });
    assert_eq!(result, Err(SchedError::NotOnline(CpuId(1))));
}

#[test]
fn test_guard_restores_interrupts() {
    let sched = make_sched(2);

    on_cpu(&sched, CpuId(1), |g| {
        assert!(!sched.platform().irqs_enabled_on(CpuId(1)));
        assert!(g.saved().was_enabled());
    });

    assert!(sched.platform().irqs_enabled_on(CpuId(1)));
}

// ============================================================================
// Timer Path
// ============================================================================

#[test]
fn test_timer_switches_to_earlier_deadline() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);
    let b = attach_at(&sched, cpu, 2, 5);

    on_cpu(&sched, cpu, |g| {
        sched.enqueue(g, a).unwrap();
        sched.enqueue(g, b).unwrap();

        let first = sched.schedule(g).unwrap();
        assert_eq!(
            first,
            Some(Switch {
                cpu,
                from: Next::Idle,
                to: Next::Runnable(a)
            })
        );

        // a: 0 -> 10, b (5) wins.
        let second = sched.timer_interrupt(g).unwrap();
        assert_eq!(second.map(|s| s.to), Some(Next::Runnable(b)));

        // b: 5 -> 15, a (10) wins.
        let third = sched.timer_interrupt(g).unwrap();
        assert_eq!(third.map(|s| s.to), Some(Next::Runnable(a)));
        assert_eq!(sched.running(g).unwrap(), Next::Runnable(a));
    });

    assert_eq!(deadline(&sched, cpu, a), Some(10));
    assert_eq!(deadline(&sched, cpu, b), Some(15));

    let stats = sched.stats(cpu).unwrap();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.context_switches, 3);
    assert_eq!(stats.preemptions, 2);
    assert_eq!(stats.voluntary_switches, 1);

    assert_eq!(
        sched.platform().switches(),
        vec![
            SwitchRecord { cpu, from: Next::Idle, to: Next::Runnable(a) },
            SwitchRecord { cpu, from: Next::Runnable(a), to: Next::Runnable(b) },
            SwitchRecord { cpu, from: Next::Runnable(b), to: Next::Runnable(a) },
        ]
    );
}

#[test]
fn test_timer_keeps_sole_context_running() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);

    on_cpu(&sched, cpu, |g| {
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();

        for _ in 0..3 {
            assert_eq!(sched.timer_interrupt(g).unwrap(), None);
        }
        assert_eq!(sched.running(g).unwrap(), Next::Runnable(a));
    });

    assert_eq!(deadline(&sched, cpu, a), Some(30));
    assert_eq!(sched.platform().switches().len(), 1);
}

#[test]
fn test_timer_on_idle_cpu_is_quiet() {
    let sched = make_sched(1);

    let result = on_cpu(&sched, CpuId::BOOT, |g| sched.timer_interrupt(g));

    assert_eq!(result, Ok(None));
    assert!(sched.platform().switches().is_empty());
    assert_eq!(sched.stats(CpuId::BOOT).unwrap().ticks, 1);
}

#[test]
fn test_fixed_period_discipline() {
    let platform = MockPlatform::new(1);
    let sched = Scheduler::with_discipline(platform, SchedConfig::new(), FixedPeriod::new(3))
        .unwrap();
    sched.bring_up_cpu(CpuId::BOOT).unwrap();

    on_cpu(&sched, CpuId::BOOT, |g| {
        let a = sched
            .attach(g, SchedContext::for_thread(1).with_deadline(0))
            .unwrap();
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();
        sched.timer_interrupt(g).unwrap();

        let dl = sched
            .with_ready_queue(g, |rq| rq.get(a).map(|sc| sc.deadline()))
            .unwrap();
        assert_eq!(dl, Some(3));
    });
}

// ============================================================================
// Context Binding
// ============================================================================

#[test]
fn test_create_starts_at_virtual_time() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;

    on_cpu(&sched, cpu, |g| {
        let a = sched.create(g, 1).unwrap();
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();
        sched.timer_interrupt(g).unwrap();

        // a has advanced to 10; a newcomer must not get ahead of it.
        let b = sched.create(g, 2).unwrap();
        let dl = sched
            .with_ready_queue(g, |rq| rq.get(b).map(|sc| sc.deadline()))
            .unwrap();
        assert_eq!(dl, Some(10));
    });
}

#[test]
fn test_detach_running_context() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);

    on_cpu(&sched, cpu, |g| {
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();

        let sc = sched.detach(g, a).unwrap();
        assert!(!sc.is_enqueued());
        assert_eq!(sched.detach(g, a).unwrap_err(), SchedError::UnknownContext);

        let switch = sched.schedule(g).unwrap();
        assert_eq!(switch.map(|s| s.to), Some(Next::Idle));
    });

    assert_eq!(sched.stats(cpu).unwrap().idle_switches, 1);
}

// ============================================================================
// Local Wake / Block
// ============================================================================

#[test]
fn test_local_wake_on_idle_cpu_reschedules() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);

    on_cpu(&sched, cpu, |g| {
        sched.wake(g, cpu, a).unwrap();
        assert_eq!(sched.next_to_run(g).unwrap(), Next::Runnable(a));

        // The pending reschedule is picked up on the next tick.
        let switch = sched.timer_interrupt(g).unwrap();
        assert_eq!(switch.map(|s| s.to), Some(Next::Runnable(a)));
    });
}

#[test]
fn test_wake_is_idempotent() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);

    on_cpu(&sched, cpu, |g| {
        sched.wake(g, cpu, a).unwrap();
        sched.wake(g, cpu, a).unwrap();
        let len = sched.with_ready_queue(g, |rq| rq.len()).unwrap();
        assert_eq!(len, 1);
    });
}

#[test]
fn test_wake_raises_stale_deadline_to_virtual_time() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 500);
    let sleeper = attach_at(&sched, cpu, 2, 3);

    on_cpu(&sched, cpu, |g| {
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();
        sched.wake(g, cpu, sleeper).unwrap();

        // Running a is at 500; the sleeper does not jump ahead of it.
        assert_eq!(sched.next_to_run(g).unwrap(), Next::Runnable(a));
    });

    assert_eq!(deadline(&sched, cpu, sleeper), Some(500));
}

#[test]
fn test_local_block_running_goes_idle() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);

    on_cpu(&sched, cpu, |g| {
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();

        sched.block(g, cpu, a).unwrap();
        // A blocked context is not requeued by the tick.
        let switch = sched.timer_interrupt(g).unwrap();
        assert_eq!(switch.map(|s| s.to), Some(Next::Idle));

        let contains = sched.with_ready_queue(g, |rq| rq.contains(a)).unwrap();
        assert!(!contains);
    });

    assert_eq!(deadline(&sched, cpu, a), Some(0));
}

#[test]
fn test_local_wake_unknown_context() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);

    let result = on_cpu(&sched, cpu, |g| {
        sched.detach(g, a).unwrap();
        sched.wake(g, cpu, a)
    });

    assert_eq!(result, Err(SchedError::UnknownContext));
}

// ============================================================================
// Cross-CPU Wake / Block
// ============================================================================

#[test]
fn test_remote_wake_goes_through_mailbox_and_ipi() {
    let sched = make_sched(2);
    let remote = CpuId(1);
    let b = attach_at(&sched, remote, 1, 0);
    let sent_before = sched.stats(CpuId::BOOT).unwrap().ipis_sent;

    on_cpu(&sched, CpuId::BOOT, |g| {
        sched.wake(g, remote, b).unwrap();
    });

    assert_eq!(
        sched.platform().ipis(),
        vec![SentIpi {
            msg: IpiMessage::Reschedule,
            from: CpuId::BOOT,
            to: remote
        }]
    );
    let boot_stats = sched.stats(CpuId::BOOT).unwrap();
    assert_eq!(boot_stats.ipis_sent, sent_before + 1);
    assert_eq!(boot_stats.remote_wakeups, 1);

    // Nothing happens on the remote CPU until it takes the IPI.
    let queued = on_cpu(&sched, remote, |g| {
        sched.with_ready_queue(g, |rq| rq.contains(b)).unwrap()
    });
    assert!(!queued);

    let switch = on_cpu(&sched, remote, |g| {
        sched.handle_ipi(g, IpiMessage::Reschedule).unwrap()
    });
    assert_eq!(
        switch,
        Some(Switch {
            cpu: remote,
            from: Next::Idle,
            to: Next::Runnable(b)
        })
    );
    assert_eq!(sched.stats(remote).unwrap().ipis_received, 1);
}

#[test]
fn test_remote_block_goes_through_mailbox() {
    let sched = make_sched(2);
    let remote = CpuId(1);
    let b = attach_at(&sched, remote, 1, 0);

    on_cpu(&sched, remote, |g| {
        sched.enqueue(g, b).unwrap();
        sched.schedule(g).unwrap();
    });

    on_cpu(&sched, CpuId::BOOT, |g| sched.block(g, remote, b)).unwrap();

    let switch = on_cpu(&sched, remote, |g| {
        sched.handle_ipi(g, IpiMessage::Reschedule).unwrap()
    });
    assert_eq!(switch.map(|s| s.to), Some(Next::Idle));

    let stats = sched.stats(remote).unwrap();
    assert_eq!(stats.idle_switches, 1);
    assert_eq!(stats.voluntary_switches, 2);
}

#[test]
fn test_remote_request_for_stale_context_is_dropped() {
    let sched = make_sched(2);
    let remote = CpuId(1);
    let b = attach_at(&sched, remote, 1, 0);
    on_cpu(&sched, remote, |g| sched.detach(g, b)).unwrap();

    on_cpu(&sched, CpuId::BOOT, |g| sched.wake(g, remote, b)).unwrap();
    let switch = on_cpu(&sched, remote, |g| {
        sched.handle_ipi(g, IpiMessage::Reschedule)
    });

    assert_eq!(switch, Ok(None));
}

#[test]
fn test_remote_wake_rejects_bad_targets() {
    let sched = Scheduler::new(MockPlatform::new(2), SchedConfig::new().with_cpus(2)).unwrap();
    sched.bring_up_cpu(CpuId::BOOT).unwrap();
    let a = on_cpu(&sched, CpuId::BOOT, |g| {
        sched.attach(g, SchedContext::for_thread(1)).unwrap()
    });

    on_cpu(&sched, CpuId::BOOT, |g| {
        assert_eq!(
            sched.wake(g, CpuId(1), a),
            Err(SchedError::NotOnline(CpuId(1)))
        );
        assert_eq!(
            sched.wake(g, CpuId(9), a),
            Err(SchedError::InvalidCpu(CpuId(9)))
        );
    });
    assert!(sched.platform().ipis().is_empty());
}

#[test]
fn test_mailbox_overflow_reported() {
    let config = SchedConfig {
        mailbox_depth: 2,
        ..SchedConfig::new().with_cpus(2)
    };
    let sched = Scheduler::new(MockPlatform::new(2), config).unwrap();
    sched.bring_up_cpu(CpuId::BOOT).unwrap();
    sched.bring_up_cpu(CpuId(1)).unwrap();
    let ids: Vec<_> = (0..3).map(|tid| attach_at(&sched, CpuId(1), tid, 0)).collect();

    let results: Vec<_> = on_cpu(&sched, CpuId::BOOT, |g| {
        ids.iter().map(|&id| sched.wake(g, CpuId(1), id)).collect()
    });

    assert_eq!(results, vec![Ok(()), Ok(()), Err(SchedError::MailboxFull)]);
}

#[test]
fn test_idle_inherits_deadline_of_blocked_context() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);

    on_cpu(&sched, cpu, |g| {
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();
        for _ in 0..3 {
            sched.timer_interrupt(g).unwrap();
        }

        sched.block(g, cpu, a).unwrap();
        let switch = sched.schedule(g).unwrap();
        assert_eq!(switch.map(|s| s.to), Some(Next::Idle));

        let idle = sched.with_ready_queue(g, |rq| rq.idle_deadline()).unwrap();
        assert_eq!(idle, 30);

        // A newcomer on the idle CPU starts level with the sleeper.
        let b = sched.create(g, 2).unwrap();
        let dl = sched
            .with_ready_queue(g, |rq| rq.get(b).map(|sc| sc.deadline()))
            .unwrap();
        assert_eq!(dl, Some(30));
    });

    assert_eq!(deadline(&sched, cpu, a), Some(30));
}

#[test]
fn test_idle_inherits_deadline_of_detached_context() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 20);

    on_cpu(&sched, cpu, |g| {
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();
        sched.detach(g, a).unwrap();
        sched.schedule(g).unwrap();

        let idle = sched.with_ready_queue(g, |rq| rq.idle_deadline()).unwrap();
        assert_eq!(idle, 20);
    });
}

#[test]
fn test_switch_stamped_with_platform_tick() {
    let sched = make_sched(1);
    let cpu = CpuId::BOOT;
    let a = attach_at(&sched, cpu, 1, 0);

    sched.platform().advance(42);
    on_cpu(&sched, cpu, |g| {
        sched.enqueue(g, a).unwrap();
        sched.schedule(g).unwrap();
    });
    assert_eq!(sched.stats(cpu).unwrap().last_switch_tick, 42);

    // No switch, no new stamp.
    sched.platform().advance(8);
    on_cpu(&sched, cpu, |g| sched.timer_interrupt(g)).unwrap();
    assert_eq!(sched.stats(cpu).unwrap().last_switch_tick, 42);
}

// ============================================================================
// Hotplug
// ============================================================================

#[test]
fn test_trigger_hotplug_event_unicast_and_broadcast() {
    let sched = make_sched(3);
    let sent_before = sched.stats(CpuId::BOOT).unwrap().ipis_sent;

    sched.trigger_hotplug_event(Some(CpuId(2)));
    sched.trigger_hotplug_event(None);

    assert_eq!(
        sched.platform().ipis(),
        vec![SentIpi {
            msg: IpiMessage::Hotplug,
            from: CpuId::BOOT,
            to: CpuId(2)
        }]
    );
    assert_eq!(
        sched.platform().broadcasts(),
        vec![Broadcast {
            msg: IpiMessage::Hotplug,
            from: CpuId::BOOT
        }]
    );
    assert_eq!(sched.stats(CpuId::BOOT).unwrap().ipis_sent, sent_before + 2);
}

#[test]
fn test_hotplug_ipi_reevaluates_queue() {
    let sched = make_sched(2);
    let remote = CpuId(1);
    let b = attach_at(&sched, remote, 1, 0);
    on_cpu(&sched, remote, |g| sched.enqueue(g, b)).unwrap();

    let switch = on_cpu(&sched, remote, |g| {
        sched.handle_ipi(g, IpiMessage::Hotplug).unwrap()
    });

    assert_eq!(switch.map(|s| s.to), Some(Next::Runnable(b)));
}

#[test]
fn test_hotplug_ipi_refreshes_online_view() {
    let sched = Scheduler::new(MockPlatform::new(3), SchedConfig::new().with_cpus(3)).unwrap();
    sched.bring_up_cpu(CpuId::BOOT).unwrap();
    sched.bring_up_cpu(CpuId(1)).unwrap();

    let seen = on_cpu(&sched, CpuId(1), |g| sched.online_seen(g)).unwrap();
    assert_eq!(seen, 0b011);

    sched.bring_up_cpu(CpuId(2)).unwrap();
    assert_eq!(sched.online_mask(), 0b111);

    // Not refreshed until the notification arrives.
    on_cpu(&sched, CpuId(1), |g| {
        assert_eq!(sched.online_seen(g), Ok(0b011));
        sched.handle_ipi(g, IpiMessage::Hotplug).unwrap();
        assert_eq!(sched.online_seen(g), Ok(0b111));
    });
}

#[test]
fn test_take_down_and_bring_back() {
    let sched = make_sched(2);
    let remote = CpuId(1);

    on_cpu(&sched, remote, |g| sched.take_down_cpu(g)).unwrap();
    assert!(!sched.is_online(remote));
    assert_eq!(
        sched.platform().broadcasts(),
        vec![Broadcast {
            msg: IpiMessage::Hotplug,
            from: remote
        }]
    );

    assert_eq!(
        on_cpu(&sched, remote, |g| sched.take_down_cpu(g)),
        Err(SchedError::NotOnline(remote))
    );

    // The disarmed timeout ignores ticks while offline.
    on_cpu(&sched, remote, |g| {
        let empty = sched.with_ready_queue(g, |rq| rq.is_empty()).unwrap();
        assert!(empty);
        assert_eq!(sched.timer_interrupt(g), Ok(None));
    });

    // Remote wakeups to an offline CPU are refused.
    let b = attach_at(&sched, remote, 1, 0);
    assert_eq!(
        on_cpu(&sched, CpuId::BOOT, |g| sched.wake(g, remote, b)),
        Err(SchedError::NotOnline(remote))
    );

    sched.bring_up_cpu(remote).unwrap();
    assert!(sched.is_online(remote));
    on_cpu(&sched, remote, |g| {
        sched.enqueue(g, b).unwrap();
        let switch = sched.timer_interrupt(g).unwrap();
        assert_eq!(switch.map(|s| s.to), Some(Next::Runnable(b)));
    });
}

#[test]
fn test_boot_cpu_cannot_go_offline() {
    let sched = make_sched(2);

    let result = on_cpu(&sched, CpuId::BOOT, |g| sched.take_down_cpu(g));

    assert_eq!(result, Err(SchedError::BootCpuOffline));
    assert!(sched.is_online(CpuId::BOOT));
}
