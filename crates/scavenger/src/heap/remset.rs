//! Remembered Set - Old-to-Young Slot Tracking
//!
//! Records the addresses of reference slots outside young regions that
//! point into young regions. The next young pause treats every recorded
//! slot as a root and rebuilds the set afterwards.
//!
//! Entries are slot addresses (word index for wide slots, half-word index
//! for narrow slots). Insertion order is kept so that root claiming is
//! deterministic for a given mutator history.

use indexmap::IndexSet;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct RememberedSet {
    slots: Mutex<IndexSet<usize>>,
}

impl RememberedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, slot: usize) {
        self.slots.lock().insert(slot);
    }

    /// Add a batch of slot addresses, typically a worker's redirty queue
    pub fn record_all<I: IntoIterator<Item = usize>>(&self, slots: I) {
        self.slots.lock().extend(slots);
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.slots.lock().contains(&slot)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Remove and return every recorded slot
    pub fn take(&self) -> Vec<usize> {
        std::mem::take(&mut *self.slots.lock()).into_iter().collect()
    }

    /// Keep only the slots satisfying `keep`
    pub fn retain<F: FnMut(usize) -> bool>(&self, mut keep: F) {
        self.slots.lock().retain(|&slot| keep(slot));
    }
}
