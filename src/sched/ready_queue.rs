//! Per-CPU ready queue
//!
//! An array-backed binary min-heap of runnable scheduling contexts ordered by
//! [`SchedKey`] (virtual deadline, then admission sequence). Children of slot
//! `a` live at `2a + 1` and `2a + 2`.
//!
//! Every enqueued context remembers its own heap slot (`ready_link`), and
//! every swap updates the slots of both displaced contexts. That makes the
//! membership test O(1) and `dequeue`/`requeue` O(log n) without a separate
//! index table.
//!
//! Capacity is fixed when the queue is built and the backing array is never
//! reallocated afterwards, so none of the heap operations allocate. Running
//! out of slots is a configuration error and halts the kernel.
//!
//! The queue has no locking of its own. The scheduler façade only hands out
//! `&mut ReadyQueue` to the owning CPU while it holds an
//! [`IrqGuard`](crate::arch::IrqGuard).

extern crate alloc;

use alloc::vec::Vec;

use super::arena::ScArena;
use super::context::{SchedContext, SchedKey, ScId};
use super::policy::Discipline;
use super::types::{CpuId, READY_QUEUE_CAPACITY};

/// What a CPU should run next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    Runnable(ScId),
    /// Nothing is ready; run the idle loop.
    Idle,
}

impl Next {
    #[inline]
    pub fn sc(self) -> Option<ScId> {
        match self {
            Next::Runnable(id) => Some(id),
            Next::Idle => None,
        }
    }

    #[inline]
    pub fn is_idle(self) -> bool {
        self == Next::Idle
    }
}

/// Heap element. The key is cached so sifting never chases the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeapEntry {
    id: ScId,
    key: SchedKey,
}

pub struct ReadyQueue {
    cpu: CpuId,
    heap: Vec<HeapEntry>,
    capacity: usize,
    arena: ScArena,
    current_sched: Option<ScId>,
    /// Last context passed to `activate`. Unlike `current_sched` this
    /// survives `invalidate_sched`, so idle can inherit its deadline.
    last_active: Option<ScId>,
    idle_deadline: u64,
    next_seq: u64,
}

impl ReadyQueue {
    /// Build a queue for `cpu` holding at most `capacity` runnable contexts.
    pub fn new(cpu: CpuId, capacity: usize) -> Self {
        debug_assert!(capacity > 0 && capacity <= READY_QUEUE_CAPACITY);
        let capacity = capacity.clamp(1, READY_QUEUE_CAPACITY);
        Self {
            cpu,
            heap: Vec::with_capacity(capacity),
            capacity,
            arena: ScArena::new(),
            current_sched: None,
            last_active: None,
            idle_deadline: 0,
            next_seq: 0,
        }
    }

    #[inline]
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    // ------------------------------------------------------------------
    // Binding contexts to this CPU
    // ------------------------------------------------------------------

    /// Bind `sc` to this CPU. The context starts out not enqueued.
    pub fn attach(&mut self, mut sc: SchedContext) -> ScId {
        sc.ready_link = None;
        let id = self.arena.insert(sc);
        crate::ktrace!("{}: attached {}", self.cpu, id);
        id
    }

    /// Unbind a context (thread exit or migration). Dequeues it first.
    pub fn detach(&mut self, id: ScId) -> Option<SchedContext> {
        self.arena.get(id)?;
        self.dequeue(id);
        if self.current_sched == Some(id) {
            self.current_sched = None;
        }
        let sc = self.arena.remove(id);
        if self.last_active == Some(id) {
            self.last_active = None;
            if let Some(sc) = &sc {
                self.idle_deadline = sc.deadline();
            }
        }
        crate::ktrace!("{}: detached {}", self.cpu, id);
        sc
    }

    /// Number of contexts bound to this CPU, enqueued or not.
    #[inline]
    pub fn attached(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub fn get(&self, id: ScId) -> Option<&SchedContext> {
        self.arena.get(id)
    }

    // ------------------------------------------------------------------
    // Heap operations
    // ------------------------------------------------------------------

    /// Make `id` runnable. No-op if it is already enqueued or stale.
    ///
    /// Returns true if the context was inserted.
    pub fn enqueue(&mut self, id: ScId) -> bool {
        let seq = self.next_seq;
        let Some(sc) = self.arena.get_mut(id) else {
            crate::kdebug!("{}: enqueue of stale {}", self.cpu, id);
            return false;
        };
        if sc.is_enqueued() {
            return false;
        }

        if self.heap.len() >= self.capacity {
            crate::kfatal!(
                "{}: ready queue overflow ({} runnable contexts)",
                self.cpu,
                self.capacity
            );
            panic!("ready queue capacity {} exceeded", self.capacity);
        }

        self.next_seq += 1;
        sc.set_seq(seq);
        let slot = self.heap.len();
        sc.ready_link = Some(slot);
        let key = sc.key();
        self.heap.push(HeapEntry { id, key });
        self.heap_up(slot);
        true
    }

    /// Remove `id` from the heap. No-op if it is not enqueued or stale.
    ///
    /// Returns true if the context was removed.
    pub fn dequeue(&mut self, id: ScId) -> bool {
        let Some(slot) = self.arena.get_mut(id).and_then(|sc| sc.ready_link.take()) else {
            return false;
        };
        debug_assert_eq!(self.heap[slot].id, id);

        let last = self.heap.len() - 1;
        if slot == last {
            self.heap.pop();
            return true;
        }

        let moved = self.heap[last];
        self.heap.pop();
        self.heap[slot] = moved;
        self.set_link(moved.id, slot);

        // The former last leaf may belong above or below the hole.
        let slot = self.heap_down(slot);
        self.heap_up(slot);
        true
    }

    /// [`dequeue`](Self::dequeue) for a selection result. The idle entity
    /// is never part of the heap, so dequeuing it changes nothing.
    pub fn dequeue_next(&mut self, next: Next) -> bool {
        match next {
            Next::Runnable(id) => self.dequeue(id),
            Next::Idle => {
                crate::kdebug!("{}: ignoring dequeue of idle", self.cpu);
                false
            }
        }
    }

    /// Re-admit `id` after its deadline grew, enqueuing it if absent.
    ///
    /// Since the key only ever increases, the context is sifted down from
    /// where it sits instead of being removed and reinserted.
    pub fn requeue(&mut self, id: ScId) {
        let seq = self.next_seq;
        let Some(sc) = self.arena.get_mut(id) else {
            crate::kdebug!("{}: requeue of stale {}", self.cpu, id);
            return;
        };
        let Some(slot) = sc.ready_link else {
            self.enqueue(id);
            return;
        };

        self.next_seq += 1;
        sc.set_seq(seq);
        let key = sc.key();
        debug_assert!(key >= self.heap[slot].key, "requeue would move {} up", id);
        self.heap[slot].key = key;
        self.heap_down(slot);
    }

    /// Earliest-deadline runnable context, or [`Next::Idle`].
    ///
    /// When nothing is enqueued the idle deadline is synced to the last
    /// active context, even one that has since blocked or been invalidated,
    /// so a later wakeup is not ordered against a stale idle deadline.
    pub fn next_to_run(&mut self) -> Next {
        if let Some(root) = self.heap.first() {
            return Next::Runnable(root.id);
        }

        if let Some(sc) = self.last_active.and_then(|id| self.arena.get(id)) {
            self.idle_deadline = sc.deadline();
        }
        Next::Idle
    }

    /// Record what this CPU is actually executing.
    ///
    /// This is separate from heap membership: a running context may already
    /// have been dequeued (blocked) pending the next reschedule.
    #[inline]
    pub fn activate(&mut self, next: Next) {
        self.current_sched = next.sc();
        if let Next::Runnable(id) = next {
            self.last_active = Some(id);
        }
    }

    #[inline]
    pub fn current_sched(&self) -> Option<ScId> {
        self.current_sched
    }

    /// Forget the current context so the next reschedule re-derives the
    /// winner from the heap.
    #[inline]
    pub fn invalidate_sched(&mut self) {
        self.current_sched = None;
    }

    // ------------------------------------------------------------------
    // Budget and deadline updates that must keep the heap consistent
    // ------------------------------------------------------------------

    /// Replenish `id` under `discipline` and requeue it.
    pub fn replenish(&mut self, id: ScId, discipline: &dyn Discipline) {
        let Some(sc) = self.arena.get_mut(id) else {
            return;
        };
        discipline.replenish(sc);
        crate::ktrace!(
            "{}: replenished {} (dl={}, {})",
            self.cpu,
            id,
            sc.deadline(),
            discipline.name()
        );
        self.requeue(id);
    }

    /// Move `id`'s deadline forward to `deadline` and requeue it.
    pub fn postpone(&mut self, id: ScId, deadline: u64) {
        let Some(sc) = self.arena.get_mut(id) else {
            return;
        };
        sc.raise_deadline(deadline);
        self.requeue(id);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn contains(&self, id: ScId) -> bool {
        self.arena.get(id).map(|sc| sc.is_enqueued()).unwrap_or(false)
    }

    #[inline]
    pub fn idle_deadline(&self) -> u64 {
        self.idle_deadline
    }

    /// Ordering key of `next`. Idle sorts after every runnable context with
    /// the same deadline.
    pub fn key_of(&self, next: Next) -> Option<SchedKey> {
        match next {
            Next::Runnable(id) => self.arena.get(id).map(|sc| sc.key()),
            Next::Idle => Some(SchedKey {
                deadline: self.idle_deadline,
                seq: u64::MAX,
            }),
        }
    }

    /// Heap contents in array order.
    pub fn heap(&self) -> impl Iterator<Item = (ScId, SchedKey)> + '_ {
        self.heap.iter().map(|e| (e.id, e.key))
    }

    /// Verify the heap property and every back-reference.
    pub fn check_heap(&self) -> bool {
        for (slot, entry) in self.heap.iter().enumerate() {
            if slot > 0 && self.heap[(slot - 1) / 2].key > entry.key {
                return false;
            }
            match self.arena.get(entry.id) {
                Some(sc) if sc.ready_link == Some(slot) && sc.key() == entry.key => {}
                _ => return false,
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Sifting
    // ------------------------------------------------------------------

    #[inline]
    fn set_link(&mut self, id: ScId, slot: usize) {
        if let Some(sc) = self.arena.get_mut(id) {
            sc.ready_link = Some(slot);
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let (ida, idb) = (self.heap[a].id, self.heap[b].id);
        self.set_link(ida, a);
        self.set_link(idb, b);
    }

    /// Returns the final slot.
    fn heap_up(&mut self, mut slot: usize) -> usize {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.heap[parent].key <= self.heap[slot].key {
                break;
            }
            self.swap(parent, slot);
            slot = parent;
        }
        slot
    }

    /// Returns the final slot.
    fn heap_down(&mut self, mut slot: usize) -> usize {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.heap[right].key < self.heap[left].key {
                right
            } else {
                left
            };
            if self.heap[slot].key <= self.heap[child].key {
                break;
            }
            self.swap(slot, child);
            slot = child;
        }
        slot
    }
}
