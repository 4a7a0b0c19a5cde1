//! Monitor Table - Displaced Header Storage
//!
//! Locking an object moves its unlocked header into a monitor slot and
//! replaces the header with a locked mark pointing at that slot. The GC
//! reads and updates the displaced header (age) through the slot.

use crate::error::{Result, ScavengeError};
use crate::object::MarkWord;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub struct MonitorTable {
    slots: Box<[AtomicU64]>,
    next: AtomicUsize,
}

impl MonitorTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            next: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim a slot holding `displaced`
    pub fn claim(&self, displaced: MarkWord) -> Result<usize> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed);
        match self.slots.get(slot) {
            Some(cell) => {
                cell.store(displaced.raw(), Ordering::Release);
                Ok(slot)
            }
            None => Err(ScavengeError::MonitorTableFull {
                capacity: self.slots.len(),
            }),
        }
    }

    pub fn displaced(&self, slot: usize) -> MarkWord {
        MarkWord::from_raw(self.slots[slot].load(Ordering::Acquire))
    }

    pub fn set_displaced(&self, slot: usize, mark: MarkWord) {
        self.slots[slot].store(mark.raw(), Ordering::Release);
    }
}
