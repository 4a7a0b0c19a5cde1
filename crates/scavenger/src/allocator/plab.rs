//! PLAB - Promotion-Local Allocation Buffers
//!
//! Each GC worker copies objects into private bump-pointer buffers carved
//! out of shared GC alloc regions, one per (destination × NUMA node).
//!
//! ```text
//! PLAB:  bottom                 top                  end
//!          │████ copied ████████│░░░░░ remaining ░░░░│
//! ```
//!
//! Word accounting per buffer over a pause:
//!
//! ```text
//! allocated = copied + wasted + undo_wasted + unused
//! ```
//!
//! - *wasted*: tail discarded when the buffer is retired for a refill
//! - *undo_wasted*: speculative copies that lost the forwarding race and
//!   could not be returned to the buffer
//! - *unused*: tail discarded at the final flush
//!
//! Discarded space is overwritten with filler objects so regions stay
//! parseable.

use super::EvacAllocator;
use crate::heap::{Destination, Heap};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Target share of PLAB space lost to waste, in percent
const TARGET_PLAB_WASTE_PCT: f64 = 10.0;
/// Weight of the previous estimate in the PLAB size average
const PLAB_SIZE_HISTORY_WEIGHT: f64 = 0.7;

/// One bump-pointer buffer
#[derive(Debug, Default)]
pub struct Plab {
    bottom: usize,
    top: usize,
    end: usize,
    allocated: usize,
    wasted: usize,
    undo_wasted: usize,
}

impl Plab {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn allocate(&mut self, words: usize) -> Option<usize> {
        if self.end - self.top >= words {
            let obj = self.top;
            self.top += words;
            Some(obj)
        } else {
            None
        }
    }

    #[inline]
    pub fn words_remaining(&self) -> usize {
        self.end - self.top
    }

    #[inline]
    pub fn contains(&self, word: usize) -> bool {
        word >= self.bottom && word < self.end
    }

    /// Install a fresh buffer of `words` words at `start`
    pub fn set_buf(&mut self, start: usize, words: usize) {
        self.bottom = start;
        self.top = start;
        self.end = start + words;
        self.allocated += words;
    }

    fn retire_internal(&mut self, heap: &Heap) -> usize {
        let leftover = self.end - self.top;
        if leftover > 0 {
            heap.fill_with_dummy(self.top, leftover);
        }
        self.bottom = 0;
        self.top = 0;
        self.end = 0;
        leftover
    }

    /// Discard the remaining space, counting it as waste
    pub fn retire(&mut self, heap: &Heap) {
        self.wasted += self.retire_internal(heap);
    }

    /// Give back a speculative allocation
    pub fn undo_allocation(&mut self, heap: &Heap, obj: usize, words: usize) {
        if self.contains(obj) {
            debug_assert!(self.contains(obj + words - 1));
            debug_assert_eq!(self.top, obj + words, "undo must target the last allocation");
            self.top = obj;
        } else {
            heap.fill_with_dummy(obj, words);
            self.undo_wasted += words;
        }
    }

    pub fn waste(&self) -> usize {
        self.wasted
    }

    pub fn undo_waste(&self) -> usize {
        self.undo_wasted
    }

    /// Retire the buffer and move its counters into `stats`
    pub fn flush_and_retire_stats(&mut self, heap: &Heap, stats: &PlabStats) {
        let unused = self.retire_internal(heap);
        stats.add_unused(unused);
        stats.add_allocated(self.allocated);
        stats.add_wasted(self.wasted);
        stats.add_undo_wasted(self.undo_wasted);
        self.allocated = 0;
        self.wasted = 0;
        self.undo_wasted = 0;
    }
}

/// Pause-wide PLAB statistics for one destination
#[derive(Debug)]
pub struct PlabStats {
    allocated: AtomicUsize,
    wasted: AtomicUsize,
    undo_wasted: AtomicUsize,
    unused: AtomicUsize,
    direct_allocated: AtomicUsize,
    desired_plab_words: usize,
    min_plab_words: usize,
    max_plab_words: usize,
}

/// Snapshot of [`PlabStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlabStatsSnapshot {
    pub allocated: usize,
    pub wasted: usize,
    pub undo_wasted: usize,
    pub unused: usize,
    pub direct_allocated: usize,
}

impl PlabStats {
    pub fn new(desired_plab_words: usize, min_plab_words: usize, max_plab_words: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            wasted: AtomicUsize::new(0),
            undo_wasted: AtomicUsize::new(0),
            unused: AtomicUsize::new(0),
            direct_allocated: AtomicUsize::new(0),
            desired_plab_words: desired_plab_words.clamp(min_plab_words, max_plab_words),
            min_plab_words,
            max_plab_words,
        }
    }

    pub fn desired_plab_words(&self) -> usize {
        self.desired_plab_words
    }

    fn add_allocated(&self, words: usize) {
        self.allocated.fetch_add(words, Ordering::Relaxed);
    }

    fn add_wasted(&self, words: usize) {
        self.wasted.fetch_add(words, Ordering::Relaxed);
    }

    fn add_undo_wasted(&self, words: usize) {
        self.undo_wasted.fetch_add(words, Ordering::Relaxed);
    }

    fn add_unused(&self, words: usize) {
        self.unused.fetch_add(words, Ordering::Relaxed);
    }

    fn add_direct_allocated(&self, words: usize) {
        self.direct_allocated.fetch_add(words, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PlabStatsSnapshot {
        PlabStatsSnapshot {
            allocated: self.allocated.load(Ordering::Relaxed),
            wasted: self.wasted.load(Ordering::Relaxed),
            undo_wasted: self.undo_wasted.load(Ordering::Relaxed),
            unused: self.unused.load(Ordering::Relaxed),
            direct_allocated: self.direct_allocated.load(Ordering::Relaxed),
        }
    }

    /// PLAB size for the next pause, estimated from this pause's usage
    ///
    /// The number of refills is chosen so that the discarded tails stay near
    /// the target waste share; the estimate is smoothed with the previous
    /// size.
    pub fn compute_next_plab_words(&self, workers: usize) -> usize {
        let stats = self.snapshot();
        if stats.allocated == 0 {
            return self.desired_plab_words;
        }
        let wasted_frac = stats.unused as f64 / stats.allocated as f64;
        let target_refills = ((wasted_frac * 50.0) / TARGET_PLAB_WASTE_PCT).max(1.0);
        let used = stats
            .allocated
            .saturating_sub(stats.wasted + stats.unused);
        let recent = (used as f64 / target_refills / workers.max(1) as f64) as usize;
        let recent = recent.clamp(self.min_plab_words, self.max_plab_words);
        let smoothed = self.desired_plab_words as f64 * PLAB_SIZE_HISTORY_WEIGHT
            + recent as f64 * (1.0 - PLAB_SIZE_HISTORY_WEIGHT);
        (smoothed as usize).clamp(self.min_plab_words, self.max_plab_words)
    }
}

/// Per-worker PLAB allocator
pub struct PlabAllocator<'a> {
    allocator: &'a EvacAllocator<'a>,
    buffers: [Vec<Plab>; Destination::COUNT],
    direct_allocated: [usize; Destination::COUNT],
    plab_fills: [usize; Destination::COUNT],
    direct_allocations: [usize; Destination::COUNT],
    undone_allocations: usize,
}

impl<'a> PlabAllocator<'a> {
    pub fn new(allocator: &'a EvacAllocator<'a>) -> Self {
        let nodes = allocator.heap().numa().node_count();
        let buffers = || (0..nodes).map(|_| Plab::new()).collect::<Vec<_>>();
        Self {
            allocator,
            buffers: [buffers(), buffers()],
            direct_allocated: [0; Destination::COUNT],
            plab_fills: [0; Destination::COUNT],
            direct_allocations: [0; Destination::COUNT],
            undone_allocations: 0,
        }
    }

    #[inline]
    fn buffer(&mut self, dest: Destination, node: usize) -> &mut Plab {
        let buffers = &mut self.buffers[dest.index()];
        let len = buffers.len();
        &mut buffers[node % len]
    }

    /// Fast path: bump in the current PLAB
    #[inline]
    pub fn plab_allocate(&mut self, dest: Destination, words: usize, node: usize) -> Option<usize> {
        self.buffer(dest, node).allocate(words)
    }

    /// Fast path, then refill or direct allocation
    pub fn allocate(
        &mut self,
        dest: Destination,
        words: usize,
        refill_failed: &mut bool,
        node: usize,
    ) -> Option<usize> {
        self.plab_allocate(dest, words, node)
            .or_else(|| self.allocate_direct_or_new_plab(dest, words, refill_failed, node))
    }

    /// Refill the PLAB if discarding its tail is cheap, else allocate directly
    ///
    /// Sets `refill_failed` when a refill was attempted and the region
    /// allocator had no space.
    pub fn allocate_direct_or_new_plab(
        &mut self,
        dest: Destination,
        words: usize,
        refill_failed: &mut bool,
        node: usize,
    ) -> Option<usize> {
        let plab_words = self.allocator.desired_plab_words(dest);
        let waste_pct = self.allocator.plab_waste_pct();

        // Only start a new PLAB if the object fits and the old tail is small
        if words <= plab_words && words * 100 < plab_words * waste_pct {
            let heap = self.allocator.heap();
            let buffer = self.buffer(dest, node);
            debug_assert!(buffer.words_remaining() < words);
            buffer.retire(heap);

            self.plab_fills[dest.index()] += 1;
            match self
                .allocator
                .par_allocate_during_gc(dest, words, plab_words, node)
            {
                Some((start, actual)) => {
                    debug_assert!(actual >= words && actual <= plab_words);
                    let buffer = self.buffer(dest, node);
                    buffer.set_buf(start, actual);
                    return buffer.allocate(words);
                }
                None => *refill_failed = true,
            }
        }

        let result = self.allocator.par_allocate_direct(dest, words, node);
        if result.is_some() {
            self.direct_allocated[dest.index()] += words;
            self.direct_allocations[dest.index()] += 1;
        }
        result
    }

    /// Give back a copy that lost the forwarding race
    pub fn undo_allocation(&mut self, dest: Destination, obj: usize, words: usize, node: usize) {
        let heap = self.allocator.heap();
        self.buffer(dest, node).undo_allocation(heap, obj, words);
        self.undone_allocations += 1;
    }

    /// Words discarded at refills so far
    pub fn waste(&self) -> usize {
        self.buffers.iter().flatten().map(Plab::waste).sum()
    }

    /// Words discarded by undos so far
    pub fn undo_waste(&self) -> usize {
        self.buffers.iter().flatten().map(Plab::undo_waste).sum()
    }

    pub fn plab_fills(&self, dest: Destination) -> usize {
        self.plab_fills[dest.index()]
    }

    pub fn direct_allocations(&self, dest: Destination) -> usize {
        self.direct_allocations[dest.index()]
    }

    pub fn direct_allocated(&self, dest: Destination) -> usize {
        self.direct_allocated[dest.index()]
    }

    pub fn undone_allocations(&self) -> usize {
        self.undone_allocations
    }

    /// Retire every buffer and publish counters to the pause-wide stats
    pub fn flush_and_retire_stats(&mut self) {
        let heap = self.allocator.heap();
        for dest in Destination::ALL {
            let stats = self.allocator.plab_stats(dest);
            for buffer in self.buffers[dest.index()].iter_mut() {
                buffer.flush_and_retire_stats(heap, stats);
            }
            stats.add_direct_allocated(self.direct_allocated[dest.index()]);
            self.direct_allocated[dest.index()] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::util::constants::KB;

    fn setup() -> (Heap, GcConfig) {
        let config = GcConfig {
            initial_heap_size: 128 * KB,
            max_heap_size: 128 * KB,
            region_size: 16 * KB,
            young_plab_size: 100,
            old_plab_size: 100,
            min_plab_size: 16,
            ..Default::default()
        };
        (Heap::new(&config).unwrap(), config)
    }

    #[test]
    fn test_refill_then_bump() {
        let (heap, config) = setup();
        let alloc = EvacAllocator::new(&heap, &config, [100, 100]);
        let mut plabs = PlabAllocator::new(&alloc);
        let mut failed = false;

        assert_eq!(plabs.plab_allocate(Destination::Young, 4, 0), None);
        let a = plabs.allocate(Destination::Young, 4, &mut failed, 0).unwrap();
        let b = plabs.plab_allocate(Destination::Young, 4, 0).unwrap();
        assert_eq!(b, a + 4);
        assert_eq!(plabs.plab_fills(Destination::Young), 1);
        assert!(!failed);
    }

    #[test]
    fn test_large_object_goes_direct() {
        let (heap, config) = setup();
        let alloc = EvacAllocator::new(&heap, &config, [100, 100]);
        let mut plabs = PlabAllocator::new(&alloc);
        let mut failed = false;
        // 10 * 100 is not below 100 * 10: too large for a PLAB
        plabs
            .allocate(Destination::Old, 10, &mut failed, 0)
            .unwrap();
        assert_eq!(plabs.direct_allocations(Destination::Old), 1);
        assert_eq!(plabs.direct_allocated(Destination::Old), 10);
        assert_eq!(plabs.plab_fills(Destination::Old), 0);
    }

    #[test]
    fn test_undo_last_allocation_returns_space() {
        let (heap, config) = setup();
        let alloc = EvacAllocator::new(&heap, &config, [100, 100]);
        let mut plabs = PlabAllocator::new(&alloc);
        let mut failed = false;
        let a = plabs.allocate(Destination::Young, 5, &mut failed, 0).unwrap();
        plabs.undo_allocation(Destination::Young, a, 5, 0);
        assert_eq!(plabs.undo_waste(), 0);
        assert_eq!(plabs.undone_allocations(), 1);
        assert_eq!(plabs.plab_allocate(Destination::Young, 5, 0), Some(a));
    }

    #[test]
    fn test_undo_outside_plab_is_waste() {
        let (heap, config) = setup();
        let alloc = EvacAllocator::new(&heap, &config, [100, 100]);
        let mut plabs = PlabAllocator::new(&alloc);
        let mut failed = false;
        let big = plabs.allocate(Destination::Young, 20, &mut failed, 0).unwrap();
        plabs.undo_allocation(Destination::Young, big, 20, 0);
        assert_eq!(plabs.undo_waste(), 20);
    }

    #[test]
    fn test_accounting_identity_after_flush() {
        let (heap, config) = setup();
        let alloc = EvacAllocator::new(&heap, &config, [100, 100]);
        let mut plabs = PlabAllocator::new(&alloc);
        let mut failed = false;
        let mut copied = 0;
        for i in 0..200 {
            let words = 3 + i % 7;
            let obj = plabs
                .allocate(Destination::Young, words, &mut failed, 0)
                .unwrap();
            if i % 11 == 0 {
                plabs.undo_allocation(Destination::Young, obj, words, 0);
            } else {
                heap.initialize_object(obj, crate::object::ObjectKind::TypeArray, words - 3, words);
                copied += words;
            }
        }
        let waste_before = plabs.waste();
        plabs.flush_and_retire_stats();
        let stats = alloc.plab_stats(Destination::Young).snapshot();
        assert_eq!(stats.wasted, waste_before);
        assert_eq!(
            stats.allocated + stats.direct_allocated,
            copied + stats.wasted + stats.undo_wasted + stats.unused
        );
        assert_eq!(plabs.waste(), 0);
    }

    #[test]
    fn test_next_plab_size_is_bounded() {
        let stats = PlabStats::new(100, 16, 2048);
        stats.add_allocated(10_000);
        stats.add_unused(100);
        let next = stats.compute_next_plab_words(2);
        assert!(next >= 16 && next <= 2048);
        assert!(next > 100, "heavy use grows the PLAB, got {}", next);
    }
}
