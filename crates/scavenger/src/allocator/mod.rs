//! Allocator Module - GC-Time Allocation
//!
//! Two layers serve evacuation:
//!
//! ```text
//!  worker ──▶ PlabAllocator (per worker, lock-free bump in a PLAB)
//!                 │ refill / direct
//!                 ▼
//!             EvacAllocator (shared, one GC alloc region per
//!                 │           destination × NUMA node, mutex per slot)
//!                 ▼ new region
//!             Heap free list
//! ```
//!
//! Survivor regions are capped per pause; once the cap or the free list is
//! exhausted, refills for that destination fail and evacuation falls back
//! to the next generation.

pub mod plab;

pub use plab::{Plab, PlabAllocator, PlabStats, PlabStatsSnapshot};

use crate::config::GcConfig;
use crate::heap::{Destination, Heap};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Region-level allocator used during a pause
pub struct EvacAllocator<'h> {
    heap: &'h Heap,
    /// Current GC alloc region per destination, per NUMA node
    alloc_regions: [Box<[Mutex<Option<usize>>]>; Destination::COUNT],
    survivor_regions: AtomicUsize,
    max_survivor_regions: usize,
    /// Regions handed out during this pause, per destination
    retained: [Mutex<Vec<usize>>; Destination::COUNT],
    plab_stats: [PlabStats; Destination::COUNT],
    waste_pct: usize,
}

impl<'h> EvacAllocator<'h> {
    pub fn new(heap: &'h Heap, config: &GcConfig, desired_plab_words: [usize; 2]) -> Self {
        let nodes = heap.numa().node_count();
        let slots = || -> Box<[Mutex<Option<usize>>]> {
            (0..nodes).map(|_| Mutex::new(None)).collect()
        };
        let max_plab = heap.region_words();
        Self {
            heap,
            alloc_regions: [slots(), slots()],
            survivor_regions: AtomicUsize::new(0),
            max_survivor_regions: config.survivor_region_limit(),
            retained: [Mutex::new(Vec::new()), Mutex::new(Vec::new())],
            plab_stats: [
                PlabStats::new(desired_plab_words[0], config.min_plab_size, max_plab),
                PlabStats::new(desired_plab_words[1], config.min_plab_size, max_plab),
            ],
            waste_pct: config.plab_buffer_waste_pct,
        }
    }

    pub fn heap(&self) -> &'h Heap {
        self.heap
    }

    pub fn plab_stats(&self, dest: Destination) -> &PlabStats {
        &self.plab_stats[dest.index()]
    }

    pub fn desired_plab_words(&self, dest: Destination) -> usize {
        self.plab_stats[dest.index()].desired_plab_words()
    }

    /// Percentage of a PLAB that may be discarded to start a new one
    pub fn plab_waste_pct(&self) -> usize {
        self.waste_pct
    }

    pub fn survivor_regions_used(&self) -> usize {
        self.survivor_regions.load(Ordering::Relaxed)
    }

    /// Allocate between `min_words` and `desired_words` for `dest`
    ///
    /// Returns the start word and the number of words granted.
    pub fn par_allocate_during_gc(
        &self,
        dest: Destination,
        min_words: usize,
        desired_words: usize,
        node: usize,
    ) -> Option<(usize, usize)> {
        let node = node % self.alloc_regions[dest.index()].len();
        let mut current = self.alloc_regions[dest.index()][node].lock();

        if let Some(index) = *current {
            if let Some(result) = self.heap.region(index).par_allocate(min_words, desired_words) {
                return Some(result);
            }
            self.heap.retire_region_tail(self.heap.region(index));
            *current = None;
        }

        let index = self.new_gc_alloc_region(dest, node)?;
        *current = Some(index);
        self.heap.region(index).par_allocate(min_words, desired_words)
    }

    /// Allocate exactly `words` outside any PLAB
    pub fn par_allocate_direct(&self, dest: Destination, words: usize, node: usize) -> Option<usize> {
        self.par_allocate_during_gc(dest, words, words, node)
            .map(|(start, _)| start)
    }

    fn new_gc_alloc_region(&self, dest: Destination, node: usize) -> Option<usize> {
        if dest == Destination::Young {
            let max = self.max_survivor_regions;
            self.survivor_regions
                .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| {
                    (n < max).then_some(n + 1)
                })
                .ok()?;
        }
        let Some(index) = self.heap.take_free_region(Some(node)) else {
            if dest == Destination::Young {
                self.survivor_regions.fetch_sub(1, Ordering::AcqRel);
            }
            log::debug!("No free region for {} GC allocation", dest.name());
            return None;
        };
        self.heap
            .region(index)
            .set_region_type(dest.region_type());
        self.retained[dest.index()].lock().push(index);
        Some(index)
    }

    /// Fill the tails of the current GC alloc regions and forget them
    ///
    /// Returns the regions allocated during the pause per destination.
    pub fn release_gc_alloc_regions(&self) -> [Vec<usize>; 2] {
        for slots in &self.alloc_regions {
            for slot in slots.iter() {
                if let Some(index) = slot.lock().take() {
                    self.heap.retire_region_tail(self.heap.region(index));
                }
            }
        }
        [
            std::mem::take(&mut *self.retained[0].lock()),
            std::mem::take(&mut *self.retained[1].lock()),
        ]
    }
}
