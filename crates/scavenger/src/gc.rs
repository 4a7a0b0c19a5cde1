//! GC Core Module - Young Pause Orchestration
//!
//! A young pause runs stop-the-world on `workers` threads:
//!
//! 1. Retire mutator regions and select the collection set
//! 2. Snapshot the remembered set
//! 3. Parallel phase: claim root and remembered-slot strides, evacuate, then
//!    drain and steal until global termination
//! 4. Flush per-worker states
//! 5. Post-evacuation cleanup
//! 6. Adapt tenuring threshold, PLAB sizes and heap size for the next pause

use crate::config::GcConfig;
use crate::error::Result;
use crate::evacuate::{
    post_evacuate, CollectionSet, EvacuationContext, EvacuationStateSet, EvacuationTotals,
    PerThreadEvacuationState, PostEvacuationSummary,
};
use crate::heap::{Destination, Heap};
use crate::logging::{GcEvent, GcLogger, GcLoggerConfig};
use crate::object::ObjRef;
use crate::policy::{
    HeapCapacity, HeapSizingController, PauseAnalytics, PauseTimeAnalytics, TenuringPolicy,
};
use crate::stats::{GcPhase, GcStats, PhaseTimer, WorkItem, WorkerSummary};
use crate::util::words_to_bytes;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Roots and remembered slots claimed per `fetch_add`
const CLAIM_STRIDE: usize = 32;

/// External roots: references held outside the heap
///
/// Handles are stable indices. A pause rewrites every root that pointed
/// into the collection set.
#[derive(Debug, Default)]
pub struct RootSet {
    roots: Vec<AtomicU64>,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root and return its handle
    pub fn add(&mut self, obj: Option<ObjRef>) -> usize {
        self.roots.push(AtomicU64::new(ObjRef::encode(obj)));
        self.roots.len() - 1
    }

    pub fn get(&self, handle: usize) -> Option<ObjRef> {
        ObjRef::decode(self.roots[handle].load(Ordering::Relaxed))
    }

    pub fn set(&self, handle: usize, obj: Option<ObjRef>) {
        self.roots[handle].store(ObjRef::encode(obj), Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    pub(crate) fn slots(&self) -> &[AtomicU64] {
        &self.roots
    }
}

/// Outcome of one young pause
#[derive(Debug, Clone, Serialize)]
pub struct EvacuationSummary {
    pub cycle: u64,
    pub pause_ms: f64,
    pub workers: usize,
    pub eden_regions: usize,
    pub survivor_regions: usize,
    pub totals: EvacuationTotals,
    /// Words copied out of young regions, summed over all workers
    pub surviving_young_words: usize,
    pub post: PostEvacuationSummary,
    /// Promotion failed at least once during the pause
    pub old_gen_exhausted: bool,
    /// Threshold the next pause starts with
    pub tenuring_threshold: u8,
    pub expanded_bytes: usize,
    pub copy_time_ms: Option<WorkerSummary>,
    pub termination_time_ms: Option<WorkerSummary>,
    pub steals: usize,
}

impl EvacuationSummary {
    pub fn evacuation_failed(&self) -> bool {
        self.totals.failed_objects > 0
    }
}

/// GarbageCollector - owns the heap and runs young pauses
///
/// Coordinates all GC components:
/// - Heap and its remembered set
/// - Tenuring policy and PLAB sizing carried between pauses
/// - Pause-time analytics driving heap expansion
/// - Stats and structured logging
pub struct GarbageCollector {
    heap: Heap,
    config: GcConfig,
    stats: GcStats,
    logger: GcLogger,
    analytics: PauseAnalytics,
    sizing: HeapSizingController,
    tenuring: TenuringPolicy,
    desired_plab_words: [usize; Destination::COUNT],
    cycle: u64,
    start_time: Instant,
    last_summary: Option<EvacuationSummary>,
}

impl GarbageCollector {
    /// Create a collector and its heap
    ///
    /// # Examples
    /// ```rust
    /// use scavenger::{GarbageCollector, GcConfig, RootSet};
    ///
    /// let mut gc = GarbageCollector::new(GcConfig {
    ///     gc_threads: Some(2),
    ///     ..Default::default()
    /// })
    /// .unwrap();
    /// let mut roots = RootSet::new();
    /// let obj = gc.heap().new_instance(0, 2).unwrap();
    /// let handle = roots.add(Some(obj));
    /// gc.collect(&roots).unwrap();
    /// assert_ne!(roots.get(handle), Some(obj));
    /// ```
    pub fn new(config: GcConfig) -> Result<Self> {
        config.validate()?;
        let heap = Heap::new(&config)?;
        let logger = if config.verbose {
            GcLogger::new(GcLoggerConfig::verbose())
        } else {
            GcLogger::default()
        };

        Ok(Self {
            analytics: PauseAnalytics::new(config.num_prev_pauses_for_heuristics),
            sizing: HeapSizingController::new(&config),
            tenuring: TenuringPolicy::new(
                config.initial_tenuring_threshold,
                config.max_tenuring_threshold,
                config.target_survivor_ratio,
            ),
            desired_plab_words: [config.young_plab_size, config.old_plab_size],
            heap,
            stats: GcStats::new(),
            logger,
            cycle: 0,
            start_time: Instant::now(),
            last_summary: None,
            config,
        })
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn logger(&self) -> &GcLogger {
        &self.logger
    }

    pub fn analytics(&self) -> &PauseAnalytics {
        &self.analytics
    }

    pub fn heap_sizing(&self) -> &HeapSizingController {
        &self.sizing
    }

    pub fn tenuring_threshold(&self) -> u8 {
        self.tenuring.threshold()
    }

    pub fn desired_plab_words(&self, dest: Destination) -> usize {
        self.desired_plab_words[dest.index()]
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn last_summary(&self) -> Option<&EvacuationSummary> {
        self.last_summary.as_ref()
    }

    /// Allocate an instance in eden, running a pause if eden is exhausted
    pub fn new_instance(
        &mut self,
        roots: &RootSet,
        ref_fields: u32,
        data_words: u32,
    ) -> Result<ObjRef> {
        match self.heap.new_instance(ref_fields, data_words) {
            Err(e) if e.is_recoverable() => {
                log::debug!("Eden exhausted ({}), collecting", e);
                self.collect(roots)?;
                self.heap.new_instance(ref_fields, data_words)
            }
            other => other,
        }
    }

    /// Allocate a reference array in eden, running a pause if eden is exhausted
    pub fn new_obj_array(&mut self, roots: &RootSet, length: usize) -> Result<ObjRef> {
        match self.heap.new_obj_array(length) {
            Err(e) if e.is_recoverable() => {
                log::debug!("Eden exhausted ({}), collecting", e);
                self.collect(roots)?;
                self.heap.new_obj_array(length)
            }
            other => other,
        }
    }

    /// Run one young pause
    ///
    /// Every root and remembered slot referring into the collection set is
    /// updated. Objects that cannot be copied stay in place and their
    /// regions become old.
    pub fn collect(&mut self, roots: &RootSet) -> Result<EvacuationSummary> {
        let timer = PhaseTimer::start();
        self.cycle += 1;
        let cycle = self.cycle;
        let workers = self.config.worker_count();
        let heap = &self.heap;

        heap.retire_mutator_regions();
        let cset = CollectionSet::young_from(heap);
        self.logger.log(GcEvent::PauseStart {
            cycle,
            eden_regions: cset.eden_regions(),
            survivor_regions: cset.survivor_regions(),
            workers,
        });

        let remembered = heap.remembered_set().take();
        let ctx = EvacuationContext::new(
            heap,
            &self.config,
            &cset,
            workers,
            self.tenuring.threshold(),
            self.desired_plab_words,
        );

        let mut states = EvacuationStateSet::new(&ctx);
        let root_claim = AtomicUsize::new(0);
        let remset_claim = AtomicUsize::new(0);
        let root_slots = roots.slots();
        std::thread::scope(|scope| {
            for state in states.all_states() {
                let ctx = &ctx;
                let remembered = &remembered;
                let root_claim = &root_claim;
                let remset_claim = &remset_claim;
                std::thread::Builder::new()
                    .name(format!("gc-worker-{}", state.worker_id()))
                    .spawn_scoped(scope, move || {
                        run_worker(state, ctx, root_slots, remembered, root_claim, remset_claim)
                    })
                    .expect("Failed to spawn GC worker thread");
            }
        });

        states.flush();
        let surviving_young_words: usize = states.surviving_young_words().iter().sum();
        drop(states);

        let post = post_evacuate(heap, &cset, &ctx);
        let totals = ctx.totals();
        let ages = ctx.age_table();
        let old_gen_exhausted = ctx.old_gen_is_full();

        let (copy_time_ms, termination_time_ms, steals) = {
            let times = ctx.phase_times().lock();
            for worker in 0..workers {
                self.logger.log(GcEvent::WorkerStats {
                    cycle,
                    worker,
                    copy_ms: times.time_ms(GcPhase::ObjCopy, worker).unwrap_or(0.0),
                    termination_ms: times.time_ms(GcPhase::Termination, worker).unwrap_or(0.0),
                    steals: times.work_item(WorkItem::Steals, worker).unwrap_or(0),
                    copied_bytes: times.work_item(WorkItem::CopiedBytes, worker).unwrap_or(0),
                });
            }
            (
                times.time_summary(GcPhase::ObjCopy),
                times.time_summary(GcPhase::Termination),
                times.work_item_sum(WorkItem::Steals),
            )
        };

        for dest in Destination::ALL {
            let old_words = self.desired_plab_words[dest.index()];
            let new_words = ctx
                .allocator()
                .plab_stats(dest)
                .compute_next_plab_words(workers);
            if new_words != old_words {
                self.logger.log(GcEvent::PlabResize {
                    cycle,
                    destination: dest.name().to_string(),
                    old_words,
                    new_words,
                });
            }
            self.desired_plab_words[dest.index()] = new_words;
        }
        let failed_regions = post.failed_regions;
        drop(ctx);

        let survivor_capacity_words = self.config.survivor_region_limit() * heap.region_words();
        let threshold = self.tenuring.update(&ages, survivor_capacity_words);
        self.logger.log(GcEvent::TenuringThreshold {
            cycle,
            threshold,
            desired_survivor_bytes: words_to_bytes(
                self.tenuring.desired_survivor_words(survivor_capacity_words),
            ),
        });

        if totals.failed_objects > 0 {
            self.logger.log(GcEvent::EvacuationFailure {
                cycle,
                regions: failed_regions,
                objects: totals.failed_objects,
            });
        }

        let pause = timer.elapsed();
        let pause_ms = pause.as_secs_f64() * 1000.0;
        self.analytics
            .record_pause(self.start_time.elapsed().as_secs_f64(), pause_ms);
        let capacity = HeapCapacity {
            committed_bytes: heap.capacity_bytes(),
            max_bytes: heap.max_capacity_bytes(),
        };
        let requested = self.sizing.expansion_amount(&self.analytics, capacity);
        let expanded_bytes = if requested > 0 {
            heap.expand_by(requested) * heap.region_bytes()
        } else {
            0
        };
        if expanded_bytes > 0 {
            self.stats.record_expansion(expanded_bytes);
            self.logger.log(GcEvent::HeapExpansion {
                cycle,
                requested_bytes: requested,
                committed_bytes: heap.capacity_bytes(),
                short_term_ratio: self.analytics.short_term_pause_time_ratio(),
                long_term_ratio: self.analytics.long_term_pause_time_ratio(),
            });
        }

        self.stats.record_collection(
            pause,
            words_to_bytes(totals.survivor_words),
            words_to_bytes(totals.promoted_words),
            totals.failed_objects,
        );
        self.logger.log(GcEvent::PauseEnd {
            cycle,
            duration_ms: pause_ms,
            survived_bytes: words_to_bytes(totals.survivor_words),
            promoted_bytes: words_to_bytes(totals.promoted_words),
            freed_regions: post.freed_regions,
        });

        let summary = EvacuationSummary {
            cycle,
            pause_ms,
            workers,
            eden_regions: cset.eden_regions(),
            survivor_regions: cset.survivor_regions(),
            totals,
            surviving_young_words,
            post,
            old_gen_exhausted,
            tenuring_threshold: threshold,
            expanded_bytes,
            copy_time_ms,
            termination_time_ms,
            steals,
        };
        self.last_summary = Some(summary.clone());
        Ok(summary)
    }

    /// Get detailed diagnostic information
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let mut diagnostics = IndexMap::new();
        let heap = self.heap.stats();
        let summary = self.stats.summary();

        diagnostics.insert("cycles".to_string(), self.cycle.to_string());
        diagnostics.insert(
            "heap_committed_bytes".to_string(),
            heap.committed_bytes.to_string(),
        );
        diagnostics.insert("heap_max_bytes".to_string(), heap.max_bytes.to_string());
        diagnostics.insert("heap_used_bytes".to_string(), heap.used_bytes.to_string());
        diagnostics.insert(
            "heap_utilization".to_string(),
            format!("{:.1}%", heap.utilization_percent()),
        );
        diagnostics.insert(
            "regions".to_string(),
            format!(
                "eden={} survivor={} old={} free={}",
                heap.eden_regions, heap.survivor_regions, heap.old_regions, heap.free_regions
            ),
        );
        diagnostics.insert(
            "tenuring_threshold".to_string(),
            self.tenuring.threshold().to_string(),
        );
        diagnostics.insert(
            "plab_words".to_string(),
            format!(
                "young={} old={}",
                self.desired_plab_words[Destination::Young.index()],
                self.desired_plab_words[Destination::Old.index()]
            ),
        );
        diagnostics.insert(
            "pause_time_ratio".to_string(),
            format!(
                "short={:.4} long={:.4}",
                self.analytics.short_term_pause_time_ratio(),
                self.analytics.long_term_pause_time_ratio()
            ),
        );
        diagnostics.insert(
            "avg_pause_ms".to_string(),
            format!("{:.3}", summary.avg_pause_ms),
        );
        diagnostics.insert(
            "max_pause_ms".to_string(),
            format!("{:.3}", summary.max_pause_ms),
        );
        diagnostics.insert(
            "failed_collections".to_string(),
            summary.failed_collections.to_string(),
        );
        diagnostics
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("cycle", &self.cycle)
            .field("tenuring_threshold", &self.tenuring.threshold())
            .field("desired_plab_words", &self.desired_plab_words)
            .finish()
    }
}

/// Body of one worker thread during the parallel phase
fn run_worker(
    state: &mut PerThreadEvacuationState<'_>,
    ctx: &EvacuationContext<'_>,
    roots: &[AtomicU64],
    remembered: &[usize],
    root_claim: &AtomicUsize,
    remset_claim: &AtomicUsize,
) {
    let worker = state.worker_id();

    let timer = PhaseTimer::start();
    let mut scanned = 0;
    while let Some(range) = claim(root_claim, roots.len()) {
        scanned += range.len();
        for root in &roots[range] {
            state.evacuate_root(root);
        }
    }
    {
        let mut times = ctx.phase_times().lock();
        times.record_time_ms(GcPhase::ExtRootScan, worker, timer.elapsed_ms());
        times.record_or_add_work_item(WorkItem::RootsScanned, worker, scanned);
    }

    let timer = PhaseTimer::start();
    let mut scanned = 0;
    while let Some(range) = claim(remset_claim, remembered.len()) {
        scanned += range.len();
        for &slot in &remembered[range] {
            state.evacuate_remembered_slot(slot);
        }
    }
    {
        let mut times = ctx.phase_times().lock();
        times.record_time_ms(GcPhase::ScanRememberedSet, worker, timer.elapsed_ms());
        times.record_or_add_work_item(WorkItem::RemSetSlotsScanned, worker, scanned);
    }

    state.evacuate_followers();
}

/// Claim the next stride of `0..len`
fn claim(counter: &AtomicUsize, len: usize) -> Option<std::ops::Range<usize>> {
    let start = counter.fetch_add(CLAIM_STRIDE, Ordering::Relaxed);
    (start < len).then(|| start..(start + CLAIM_STRIDE).min(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::KB;

    fn config() -> GcConfig {
        GcConfig {
            initial_heap_size: 256 * KB,
            max_heap_size: 512 * KB,
            region_size: 16 * KB,
            gc_threads: Some(2),
            young_plab_size: 128,
            old_plab_size: 128,
            min_plab_size: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_claim_strides() {
        let counter = AtomicUsize::new(0);
        assert_eq!(claim(&counter, 40), Some(0..32));
        assert_eq!(claim(&counter, 40), Some(32..40));
        assert_eq!(claim(&counter, 40), None);
    }

    #[test]
    fn test_root_set_handles() {
        let mut roots = RootSet::new();
        let a = roots.add(None);
        let b = roots.add(ObjRef::from_index(64));
        assert_eq!(roots.len(), 2);
        assert_eq!(roots.get(a), None);
        assert_eq!(roots.get(b), ObjRef::from_index(64));
        roots.set(a, ObjRef::from_index(128));
        assert_eq!(roots.get(a), ObjRef::from_index(128));
    }

    #[test]
    fn test_empty_collection() {
        let mut gc = GarbageCollector::new(config()).unwrap();
        let summary = gc.collect(&RootSet::new()).unwrap();
        assert_eq!(summary.cycle, 1);
        assert_eq!(summary.totals, EvacuationTotals::default());
        assert_eq!(summary.surviving_young_words, 0);
        assert!(!summary.evacuation_failed());
    }

    #[test]
    fn test_unreachable_objects_are_reclaimed() {
        let mut gc = GarbageCollector::new(config()).unwrap();
        let mut roots = RootSet::new();
        let live = gc.heap().new_instance(1, 1).unwrap();
        for _ in 0..100 {
            gc.heap().new_instance(0, 4).unwrap();
        }
        let handle = roots.add(Some(live));

        let summary = gc.collect(&roots).unwrap();
        assert_eq!(summary.totals.survivor_objects, 1);
        assert!(summary.post.freed_regions >= 1);
        let moved = roots.get(handle).unwrap();
        assert_eq!(gc.heap().age(moved), 1);
        assert_eq!(gc.heap().stats().eden_regions, 0);
    }

    #[test]
    fn test_diagnostics_keys() {
        let gc = GarbageCollector::new(config()).unwrap();
        let diagnostics = gc.diagnostics();
        assert_eq!(diagnostics.get("cycles").map(String::as_str), Some("0"));
        assert!(diagnostics.contains_key("heap_utilization"));
    }
}
