//! Generational slot storage for the contexts bound to one CPU.

extern crate alloc;

use alloc::vec::Vec;

use super::context::{SchedContext, ScId};

struct Slot {
    generation: u32,
    sc: Option<SchedContext>,
}

pub(crate) struct ScArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ScArena {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn insert(&mut self, sc: SchedContext) -> ScId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.sc = Some(sc);
            return ScId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            sc: Some(sc),
        });
        ScId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn remove(&mut self, id: ScId) -> Option<SchedContext> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let sc = slot.sc.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(sc)
    }

    #[inline]
    pub(crate) fn get(&self, id: ScId) -> Option<&SchedContext> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.sc.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: ScId) -> Option<&mut SchedContext> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.sc.as_mut()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.live
    }
}
