//! Evacuate Module - Parallel Copying of the Collection Set
//!
//! One pause runs these steps:
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ EvacuationContext (shared for the pause)                     │
//!  │   heap, EvacAllocator, TaskQueueSet, TaskTerminator,         │
//!  │   old_gen_is_full, tenuring_threshold, merged statistics     │
//!  └──────────────────────────────────────────────────────────────┘
//!        ▲                  ▲                  ▲
//!  ┌─────┴──────┐     ┌─────┴──────┐     ┌─────┴──────┐
//!  │ worker 0   │     │ worker 1   │ ... │ worker n-1 │  PerThreadEvacuationState
//!  │ PLABs      │◀───▶│ PLABs      │◀───▶│ PLABs      │  (steal via TaskQueueSet)
//!  │ age table  │     │ age table  │     │ age table  │
//!  └────────────┘     └────────────┘     └────────────┘
//!        │ flush (once, after the parallel phase)
//!        ▼
//!  post_evacuate: restore headers, retire regions, rebuild remembered set
//! ```
//!
//! The pause-wide flags `old_gen_is_full` and `tenuring_threshold` are
//! heuristics. Workers read and write them with relaxed ordering; a stale
//! read costs one extra allocation attempt.

pub mod collection_set;
pub mod par_scan_state;
pub mod post_evacuate;
pub mod preserved_marks;
pub mod state_set;
pub mod task;

pub use collection_set::CollectionSet;
pub use par_scan_state::PerThreadEvacuationState;
pub use post_evacuate::{post_evacuate, PostEvacuationSummary};
pub use preserved_marks::{PreservedMarks, PreservedMarksSet};
pub use state_set::EvacuationStateSet;
pub use task::{PartialArrayTask, ScannerTask};

use crate::allocator::EvacAllocator;
use crate::config::GcConfig;
use crate::heap::{Destination, Heap, NumaStats};
use crate::policy::AgeTable;
use crate::stats::PhaseTimes;
use crate::taskqueue::{TaskQueueSet, TaskTerminator};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Copy and failure counts merged from all workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvacuationTotals {
    pub survivor_objects: usize,
    pub survivor_words: usize,
    pub promoted_objects: usize,
    pub promoted_words: usize,
    pub failed_objects: usize,
    pub failed_words: usize,
}

#[derive(Debug, Default)]
struct TotalsCounters {
    copied_objects: [AtomicUsize; Destination::COUNT],
    copied_words: [AtomicUsize; Destination::COUNT],
    failed_objects: AtomicUsize,
    failed_words: AtomicUsize,
}

/// State shared by all workers for the duration of one pause
pub struct EvacuationContext<'a> {
    heap: &'a Heap,
    allocator: EvacAllocator<'a>,
    queues: TaskQueueSet<ScannerTask>,
    terminator: TaskTerminator,
    young_cset_length: usize,

    old_gen_is_full: AtomicBool,
    tenuring_threshold: AtomicU8,

    partial_array_chunk: usize,
    stack_trim_upper_threshold: usize,
    stack_trim_lower_threshold: usize,

    age_table: Mutex<AgeTable>,
    preserved_marks: PreservedMarksSet,
    failed_regions: Mutex<Vec<usize>>,
    numa_stats: NumaStats,
    phase_times: Mutex<PhaseTimes>,
    totals: TotalsCounters,
}

impl<'a> EvacuationContext<'a> {
    pub fn new(
        heap: &'a Heap,
        config: &GcConfig,
        cset: &CollectionSet,
        workers: usize,
        tenuring_threshold: u8,
        desired_plab_words: [usize; Destination::COUNT],
    ) -> Self {
        Self {
            heap,
            allocator: EvacAllocator::new(heap, config, desired_plab_words),
            queues: TaskQueueSet::new(workers, config.task_queue_capacity),
            terminator: TaskTerminator::new(workers),
            young_cset_length: cset.young_region_length(),
            old_gen_is_full: AtomicBool::new(false),
            tenuring_threshold: AtomicU8::new(tenuring_threshold),
            partial_array_chunk: config.partial_array_chunk,
            stack_trim_upper_threshold: config.stack_trim_upper_threshold(),
            stack_trim_lower_threshold: config.stack_trim_lower_threshold(),
            age_table: Mutex::new(AgeTable::new()),
            preserved_marks: PreservedMarksSet::new(),
            failed_regions: Mutex::new(Vec::new()),
            numa_stats: NumaStats::new(heap.numa().node_count()),
            phase_times: Mutex::new(PhaseTimes::new(workers)),
            totals: TotalsCounters::default(),
        }
    }

    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    pub fn allocator(&self) -> &EvacAllocator<'a> {
        &self.allocator
    }

    pub fn queues(&self) -> &TaskQueueSet<ScannerTask> {
        &self.queues
    }

    pub fn terminator(&self) -> &TaskTerminator {
        &self.terminator
    }

    pub fn workers(&self) -> usize {
        self.queues.size()
    }

    pub fn young_cset_length(&self) -> usize {
        self.young_cset_length
    }

    pub fn partial_array_chunk(&self) -> usize {
        self.partial_array_chunk
    }

    pub fn stack_trim_upper_threshold(&self) -> usize {
        self.stack_trim_upper_threshold
    }

    pub fn stack_trim_lower_threshold(&self) -> usize {
        self.stack_trim_lower_threshold
    }

    // ------------------------------------------------------------------
    // Pause-wide allocation flags
    // ------------------------------------------------------------------

    #[inline]
    pub fn old_gen_is_full(&self) -> bool {
        self.old_gen_is_full.load(Ordering::Relaxed)
    }

    pub fn set_old_gen_is_full(&self) {
        if !self.old_gen_is_full.swap(true, Ordering::Relaxed) {
            log::debug!("Old generation full, remaining promotions fail in place");
        }
    }

    #[inline]
    pub fn tenuring_threshold(&self) -> u8 {
        self.tenuring_threshold.load(Ordering::Relaxed)
    }

    /// Survivor space is exhausted: promote everything from now on
    pub fn disable_survivor_space(&self) {
        if self.tenuring_threshold.swap(0, Ordering::Relaxed) != 0 {
            log::debug!("Survivor space exhausted, tenuring threshold dropped to 0");
        }
    }

    // ------------------------------------------------------------------
    // Merged results
    // ------------------------------------------------------------------

    /// Remember a region that now holds self-forwarded objects
    pub fn record_failed_region(&self, index: usize) {
        self.failed_regions.lock().push(index);
    }

    pub fn failed_regions(&self) -> Vec<usize> {
        let mut regions = self.failed_regions.lock().clone();
        regions.sort_unstable();
        regions
    }

    pub fn evacuation_failed(&self) -> bool {
        !self.failed_regions.lock().is_empty()
    }

    pub fn preserved_marks(&self) -> &PreservedMarksSet {
        &self.preserved_marks
    }

    pub fn numa_stats(&self) -> &NumaStats {
        &self.numa_stats
    }

    pub fn phase_times(&self) -> &Mutex<PhaseTimes> {
        &self.phase_times
    }

    pub fn merge_age_table(&self, ages: &AgeTable) {
        self.age_table.lock().merge(ages);
    }

    pub fn age_table(&self) -> AgeTable {
        self.age_table.lock().clone()
    }

    pub(crate) fn add_copies(&self, dest: Destination, objects: usize, words: usize) {
        self.totals.copied_objects[dest.index()].fetch_add(objects, Ordering::Relaxed);
        self.totals.copied_words[dest.index()].fetch_add(words, Ordering::Relaxed);
    }

    pub(crate) fn add_failures(&self, objects: usize, words: usize) {
        self.totals.failed_objects.fetch_add(objects, Ordering::Relaxed);
        self.totals.failed_words.fetch_add(words, Ordering::Relaxed);
    }

    pub fn totals(&self) -> EvacuationTotals {
        let young = Destination::Young.index();
        let old = Destination::Old.index();
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        EvacuationTotals {
            survivor_objects: load(&self.totals.copied_objects[young]),
            survivor_words: load(&self.totals.copied_words[young]),
            promoted_objects: load(&self.totals.copied_objects[old]),
            promoted_words: load(&self.totals.copied_words[old]),
            failed_objects: load(&self.totals.failed_objects),
            failed_words: load(&self.totals.failed_words),
        }
    }
}

impl std::fmt::Debug for EvacuationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvacuationContext")
            .field("workers", &self.workers())
            .field("young_cset_length", &self.young_cset_length)
            .field("old_gen_is_full", &self.old_gen_is_full())
            .field("tenuring_threshold", &self.tenuring_threshold())
            .finish()
    }
}
