//! Per-Thread Evacuation State - Copying and Scanning on One Worker
//!
//! Each worker evacuates objects reachable from the slots it pops or
//! steals:
//!
//! ```text
//!  slot ──▶ referent in cset? ──no──▶ done
//!              │yes
//!              ▼
//!         forwarded? ──yes──▶ store forwardee in slot
//!              │no
//!              ▼
//!   copy_to_survivor_space: allocate in PLAB ─▶ CAS forwarding ─▶ copy
//!              │ allocation failed              │ lost
//!              ▼                                ▼
//!      forward to self, scan in place     undo allocation, use winner
//! ```
//!
//! All per-worker results (PLAB waste, ages, surviving words, remembered
//! slots, preserved headers) stay local until [`flush`] merges them into
//! the [`EvacuationContext`].
//!
//! [`flush`]: PerThreadEvacuationState::flush

use super::preserved_marks::PreservedMarks;
use super::{EvacuationContext, PartialArrayTask, ScannerTask};
use crate::allocator::PlabAllocator;
use crate::heap::{Destination, Heap, RegionAttr};
use crate::object::{MarkWord, NarrowSlot, ObjRef, ObjectKind, RefSlot, WideSlot, MAX_AGE};
use crate::policy::AgeTable;
use crate::stats::{GcPhase, PhaseTimer, WorkItem};
use crate::taskqueue::OverflowTaskQueue;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters per cache line; the surviving-words array is padded by one
/// line on each side so neighbouring workers never share a line
const PADDING_ELEM_NUM: usize = 64 / std::mem::size_of::<usize>();

pub struct PerThreadEvacuationState<'a> {
    ctx: &'a EvacuationContext<'a>,
    heap: &'a Heap,
    worker_id: usize,
    task_queue: &'a OverflowTaskQueue<ScannerTask>,
    plab_allocator: PlabAllocator<'a>,
    age_table: AgeTable,

    /// `PADDING | non-young | young 1..=k | PADDING`
    surviving_young_words_base: Box<[usize]>,
    young_cset_length: usize,

    /// Old-to-young slots found while copying
    redirty_slots: Vec<usize>,
    preserved_marks: PreservedMarks,
    numa_copies: Box<[usize]>,

    copied_objects: [usize; Destination::COUNT],
    copied_words: [usize; Destination::COUNT],
    failed_objects: usize,
    failed_words: usize,
    steals: usize,

    partial_array_chunk: usize,
    stack_trim_upper_threshold: usize,
    stack_trim_lower_threshold: usize,

    flushed: bool,
}

impl<'a> PerThreadEvacuationState<'a> {
    pub fn new(ctx: &'a EvacuationContext<'a>, worker_id: usize) -> Self {
        let heap = ctx.heap();
        let young_cset_length = ctx.young_cset_length();
        Self {
            ctx,
            heap,
            worker_id,
            task_queue: ctx.queues().queue(worker_id),
            plab_allocator: PlabAllocator::new(ctx.allocator()),
            age_table: AgeTable::new(),
            surviving_young_words_base: vec![0; young_cset_length + 1 + 2 * PADDING_ELEM_NUM]
                .into_boxed_slice(),
            young_cset_length,
            redirty_slots: Vec::new(),
            preserved_marks: PreservedMarks::new(),
            numa_copies: vec![0; heap.numa().node_count()].into_boxed_slice(),
            copied_objects: [0; Destination::COUNT],
            copied_words: [0; Destination::COUNT],
            failed_objects: 0,
            failed_words: 0,
            steals: 0,
            partial_array_chunk: ctx.partial_array_chunk(),
            stack_trim_upper_threshold: ctx.stack_trim_upper_threshold(),
            stack_trim_lower_threshold: ctx.stack_trim_lower_threshold(),
            flushed: false,
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Words copied out of each young region; index 0 is non-young
    pub fn surviving_young_words(&self) -> &[usize] {
        &self.surviving_young_words_base
            [PADDING_ELEM_NUM..PADDING_ELEM_NUM + self.young_cset_length + 1]
    }

    fn surviving_young_words_mut(&mut self) -> &mut [usize] {
        let end = PADDING_ELEM_NUM + self.young_cset_length + 1;
        &mut self.surviving_young_words_base[PADDING_ELEM_NUM..end]
    }

    pub fn lab_waste_words(&self) -> usize {
        self.plab_allocator.waste()
    }

    pub fn lab_undo_waste_words(&self) -> usize {
        self.plab_allocator.undo_waste()
    }

    pub fn plab_allocator(&self) -> &PlabAllocator<'a> {
        &self.plab_allocator
    }

    pub fn age_table(&self) -> &AgeTable {
        &self.age_table
    }

    pub fn failed_objects(&self) -> usize {
        self.failed_objects
    }

    #[inline]
    pub fn push_on_queue(&mut self, task: ScannerTask) {
        self.task_queue.push(task);
    }

    // ------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------

    /// Evacuate the referent of an external root and update the root
    pub fn evacuate_root(&mut self, root: &AtomicU64) {
        let Some(obj) = ObjRef::decode(root.load(Ordering::Relaxed)) else {
            return;
        };
        let region_attr = self.heap.region_attr(obj);
        if !region_attr.is_in_cset() {
            return;
        }
        let new = self.evacuate_obj(region_attr, obj);
        root.store(ObjRef::encode(Some(new)), Ordering::Relaxed);
        self.trim_queue_partially();
    }

    /// Evacuate through a remembered old-to-young slot
    pub fn evacuate_remembered_slot(&mut self, address: usize) {
        if self.heap.compressed_refs() {
            self.do_oop_evac(NarrowSlot(address));
        } else {
            self.do_oop_evac(WideSlot(address));
        }
        self.trim_queue_partially();
    }

    #[inline]
    fn evacuate_obj(&mut self, region_attr: RegionAttr, obj: ObjRef) -> ObjRef {
        let mark = self.heap.mark(obj);
        match mark.forwardee() {
            Some(forwardee) => forwardee,
            None => self.copy_to_survivor_space(region_attr, obj, mark),
        }
    }

    // ------------------------------------------------------------------
    // Task processing
    // ------------------------------------------------------------------

    pub fn dispatch_task(&mut self, task: ScannerTask) {
        match task {
            ScannerTask::Oop(slot) => self.do_oop_evac(slot),
            ScannerTask::NarrowOop(slot) => self.do_oop_evac(slot),
            ScannerTask::PartialArray(task) => self.do_partial_array(task),
        }
    }

    fn do_oop_evac<S: RefSlot>(&mut self, slot: S) {
        let heap = self.heap;
        // Remembered slots may have been cleared or already updated
        let Some(obj) = slot.load(heap) else {
            return;
        };
        let region_attr = heap.region_attr(obj);
        if !region_attr.is_in_cset() {
            return;
        }
        let new = self.evacuate_obj(region_attr, obj);
        slot.store(heap, Some(new));

        let from = heap.region_containing(slot.word());
        if from.contains(new.index()) {
            return;
        }
        if !from.is_young() || from.evacuation_failed() {
            self.enqueue_card_if_tracked(slot.address(), new);
        }
    }

    fn do_partial_array(&mut self, task: PartialArrayTask) {
        let heap = self.heap;
        let from = task.array;
        let Some(to) = heap.forwardee(from) else {
            debug_assert!(false, "partial array {:?} is not forwarded", from);
            return;
        };
        debug_assert_ne!(from, to, "partial array {:?} forwarded to itself", from);

        // The from-space copy keeps the real length
        let length = heap.array_length(from);
        let start = task.start;
        let mut end = length;
        if length - start > 2 * self.partial_array_chunk {
            end = start + self.partial_array_chunk;
            heap.set_array_length(to, end);
            // Push the rest first so an idle worker can steal it
            self.push_on_queue(PartialArrayTask::new(from, end).into());
        } else {
            heap.set_array_length(to, length);
        }

        let skip_card_enqueue = heap.region_containing(to.index()).is_young();
        self.scan_slots(heap.ref_slot_range(to, start, end), skip_card_enqueue);
    }

    /// Push every in-cset referent of `obj`, last field first
    fn scan_object(&mut self, obj: ObjRef, skip_card_enqueue: bool) {
        let count = self.heap.ref_count(obj);
        if count > 0 {
            self.scan_slots(self.heap.ref_slot_range(obj, 0, count), skip_card_enqueue);
        }
    }

    fn scan_slots(&mut self, slots: Range<usize>, skip_card_enqueue: bool) {
        if self.heap.compressed_refs() {
            for address in slots.rev() {
                self.scan_field(NarrowSlot(address), skip_card_enqueue);
            }
        } else {
            for address in slots.rev() {
                self.scan_field(WideSlot(address), skip_card_enqueue);
            }
        }
    }

    #[inline]
    fn scan_field<S: RefSlot + Into<ScannerTask>>(&mut self, slot: S, skip_card_enqueue: bool) {
        let heap = self.heap;
        let Some(obj) = slot.load(heap) else {
            return;
        };
        if heap.region_attr(obj).is_in_cset() {
            self.push_on_queue(slot.into());
        } else if !skip_card_enqueue && !heap.region_containing(slot.word()).contains(obj.index()) {
            self.enqueue_card_if_tracked(slot.address(), obj);
        }
    }

    /// Remember `slot` if it now points into a young region
    #[inline]
    fn enqueue_card_if_tracked(&mut self, slot: usize, target: ObjRef) {
        if self.heap.region_containing(target.index()).is_young() {
            self.redirty_slots.push(slot);
        }
    }

    // ------------------------------------------------------------------
    // Draining and stealing
    // ------------------------------------------------------------------

    fn needs_partial_trimming(&self) -> bool {
        !self.task_queue.overflow_empty() || self.task_queue.size() > self.stack_trim_upper_threshold
    }

    /// Drain down to the lower threshold once the upper one is exceeded
    pub fn trim_queue_partially(&mut self) {
        if self.needs_partial_trimming() {
            self.trim_queue_to_threshold(self.stack_trim_lower_threshold);
        }
    }

    /// Drain the local queue and its overflow completely
    pub fn trim_queue(&mut self) {
        self.trim_queue_to_threshold(0);
    }

    fn trim_queue_to_threshold(&mut self, threshold: usize) {
        loop {
            // Refill the stealable deque from the overflow stack first
            while let Some(task) = self.task_queue.pop_overflow() {
                if !self.task_queue.try_push_to_taskqueue(task) {
                    self.dispatch_task(task);
                }
            }
            while let Some(task) = self.task_queue.pop_local(threshold) {
                self.dispatch_task(task);
            }
            if self.task_queue.overflow_empty() {
                break;
            }
        }
    }

    pub fn steal_and_trim_queue(&mut self) {
        while let Some(task) = self.ctx.queues().steal(self.worker_id) {
            self.steals += 1;
            self.dispatch_task(task);
            self.trim_queue();
        }
    }

    /// Process local and stolen work until every worker runs dry
    pub fn evacuate_followers(&mut self) {
        let timer = PhaseTimer::start();
        let mut termination_ms = 0.0;
        let mut attempts = 0;
        let steals_before = self.steals;

        self.trim_queue();
        loop {
            self.steal_and_trim_queue();
            let offer = PhaseTimer::start();
            attempts += 1;
            let terminated = self.ctx.terminator().offer_termination(self.ctx.queues());
            termination_ms += offer.elapsed_ms();
            if terminated {
                break;
            }
        }

        let total_ms = timer.elapsed_ms();
        let mut times = self.ctx.phase_times().lock();
        times.record_or_add_time_ms(GcPhase::ObjCopy, self.worker_id, total_ms - termination_ms);
        times.record_or_add_time_ms(GcPhase::Termination, self.worker_id, termination_ms);
        times.record_or_add_work_item(WorkItem::TerminationAttempts, self.worker_id, attempts);
        times.record_or_add_work_item(WorkItem::Steals, self.worker_id, self.steals - steals_before);
    }

    // ------------------------------------------------------------------
    // Copying
    // ------------------------------------------------------------------

    /// Destination and current age of an object about to be copied
    ///
    /// The age of a locked object lives in its displaced header.
    fn next_region_attr(&self, region_attr: RegionAttr, old_mark: MarkWord) -> (Destination, u8) {
        if !region_attr.is_young() {
            return (Destination::Old, 0);
        }
        let age = if old_mark.has_displaced_mark() {
            self.heap.displaced_mark(old_mark).age()
        } else {
            old_mark.age()
        };
        if age < self.ctx.tenuring_threshold() {
            (Destination::Young, age)
        } else {
            (Destination::Old, age)
        }
    }

    /// Copy `old` out of the collection set, or forward it to itself
    ///
    /// `old_mark` is the header read before the call; the copy is only
    /// installed if the header still holds it. Returns the object's new
    /// location, which is the winner's copy if another worker got there
    /// first.
    pub fn copy_to_survivor_space(
        &mut self,
        region_attr: RegionAttr,
        old: ObjRef,
        old_mark: MarkWord,
    ) -> ObjRef {
        let heap = self.heap;
        let word_sz = heap.object_size(old);
        let (mut dest, age) = self.next_region_attr(region_attr, old_mark);

        if dest == Destination::Old && self.ctx.old_gen_is_full() {
            return self.handle_evacuation_failure_par(old, old_mark, word_sz);
        }

        let from_region = heap.region_containing(old.index());
        let node = from_region.numa_node();

        let obj_ptr = match self.plab_allocator.plab_allocate(dest, word_sz, node) {
            Some(ptr) => Some(ptr),
            None => self.allocate_copy_slow(&mut dest, word_sz, node),
        };
        let Some(obj) = obj_ptr.and_then(ObjRef::from_index) else {
            return self.handle_evacuation_failure_par(old, old_mark, word_sz);
        };

        match heap.forward_to_atomic(old, obj, old_mark) {
            None => {
                heap.copy_words(old.index(), obj.index(), word_sz);

                if dest == Destination::Young {
                    let age = if age < MAX_AGE { age + 1 } else { age };
                    if old_mark.has_displaced_mark() {
                        // Install the locked header on the copy before
                        // touching the displaced one
                        heap.set_mark(obj, old_mark);
                        let displaced = heap.displaced_mark(old_mark);
                        heap.set_displaced_mark(old_mark, displaced.with_age(age));
                    } else {
                        heap.set_mark(obj, old_mark.with_age(age));
                    }
                    self.age_table.add(age, word_sz);
                } else {
                    heap.set_mark(obj, old_mark);
                }

                let young_index = from_region.young_index();
                self.surviving_young_words_mut()[young_index] += word_sz;
                self.copied_objects[dest.index()] += 1;
                self.copied_words[dest.index()] += word_sz;

                let kind = heap.kind(obj);
                if kind == ObjectKind::ObjArray
                    && heap.array_length(obj) >= self.partial_array_chunk
                {
                    // Hide the unscanned tail; chunks restore the length
                    heap.set_array_length(obj, 0);
                    self.push_on_queue(PartialArrayTask::new(old, 0).into());
                } else if kind != ObjectKind::TypeArray {
                    self.scan_object(obj, dest == Destination::Young);
                }
                obj
            }
            Some(forwardee) => {
                self.plab_allocator
                    .undo_allocation(dest, obj.index(), word_sz, node);
                forwardee
            }
        }
    }

    fn allocate_copy_slow(
        &mut self,
        dest: &mut Destination,
        word_sz: usize,
        node: usize,
    ) -> Option<usize> {
        let mut refill_failed = false;
        let obj_ptr = self
            .plab_allocator
            .allocate_direct_or_new_plab(*dest, word_sz, &mut refill_failed, node)
            .or_else(|| self.allocate_in_next_plab(dest, word_sz, refill_failed, node));
        if obj_ptr.is_some() {
            self.numa_copies[node % self.numa_copies.len()] += 1;
        }
        obj_ptr
    }

    /// Fall back from survivor to old space
    ///
    /// A failed PLAB refill closes the destination for the rest of the
    /// pause; failed direct allocations are usually large objects and say
    /// little about the remaining space.
    fn allocate_in_next_plab(
        &mut self,
        dest: &mut Destination,
        word_sz: usize,
        previous_plab_refill_failed: bool,
        node: usize,
    ) -> Option<usize> {
        match *dest {
            Destination::Young => {
                let mut old_refill_failed = false;
                let obj_ptr = self.plab_allocator.allocate(
                    Destination::Old,
                    word_sz,
                    &mut old_refill_failed,
                    node,
                );
                if previous_plab_refill_failed {
                    self.ctx.disable_survivor_space();
                }
                if obj_ptr.is_some() {
                    *dest = Destination::Old;
                } else if old_refill_failed {
                    self.ctx.set_old_gen_is_full();
                }
                obj_ptr
            }
            Destination::Old => {
                if previous_plab_refill_failed {
                    self.ctx.set_old_gen_is_full();
                }
                None
            }
        }
    }

    /// Leave `old` in place by forwarding it to itself
    ///
    /// The winner of the self-forwarding CAS flags the region, saves the
    /// header if needed and scans the object where it is.
    fn handle_evacuation_failure_par(
        &mut self,
        old: ObjRef,
        old_mark: MarkWord,
        word_sz: usize,
    ) -> ObjRef {
        let heap = self.heap;
        match heap.forward_to_atomic(old, old, old_mark) {
            None => {
                let region = heap.region_containing(old.index());
                if region.set_evacuation_failed() {
                    self.ctx.record_failed_region(region.index());
                    log::debug!(
                        "Worker {}: evacuation failed in region {}",
                        self.worker_id,
                        region.index()
                    );
                }
                self.preserved_marks.push_if_necessary(old, old_mark);
                self.failed_objects += 1;
                self.failed_words += word_sz;
                log::trace!("Worker {}: {:?} forwarded to itself", self.worker_id, old);

                // Scanned as old even when the source region is young:
                // failed regions turn old after the pause, so every young
                // referent must land in the remembered set
                self.scan_object(old, false);
                old
            }
            Some(forwardee) => forwardee,
        }
    }

    // ------------------------------------------------------------------
    // Flush
    // ------------------------------------------------------------------

    /// Merge everything this worker collected into the pause-wide state
    ///
    /// Adds this worker's surviving words into `surviving_young_words_total`
    /// and returns their sum. Must be called exactly once.
    pub fn flush(&mut self, surviving_young_words_total: &mut [usize]) -> usize {
        debug_assert!(!self.flushed, "worker {} flushed twice", self.worker_id);
        debug_assert_eq!(surviving_young_words_total.len(), self.young_cset_length + 1);
        self.flushed = true;

        let ctx = self.ctx;
        ctx.heap()
            .remembered_set()
            .record_all(self.redirty_slots.drain(..));
        ctx.numa_stats().add_object_copies(&self.numa_copies);
        self.plab_allocator.flush_and_retire_stats();
        ctx.merge_age_table(&self.age_table);
        ctx.preserved_marks()
            .add(std::mem::take(&mut self.preserved_marks));
        for dest in Destination::ALL {
            ctx.add_copies(
                dest,
                self.copied_objects[dest.index()],
                self.copied_words[dest.index()],
            );
        }
        ctx.add_failures(self.failed_objects, self.failed_words);

        let mut sum = 0;
        for (total, &words) in surviving_young_words_total
            .iter_mut()
            .zip(self.surviving_young_words())
        {
            *total += words;
            sum += words;
        }
        sum
    }
}

impl std::fmt::Debug for PerThreadEvacuationState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerThreadEvacuationState")
            .field("worker_id", &self.worker_id)
            .field("copied_objects", &self.copied_objects)
            .field("failed_objects", &self.failed_objects)
            .field("flushed", &self.flushed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::evacuate::CollectionSet;
    use crate::util::constants::KB;

    fn config() -> GcConfig {
        GcConfig {
            initial_heap_size: 256 * KB,
            max_heap_size: 256 * KB,
            region_size: 16 * KB,
            gc_threads: Some(1),
            compressed_refs: false,
            young_plab_size: 128,
            old_plab_size: 128,
            min_plab_size: 16,
            partial_array_chunk: 4,
            ..Default::default()
        }
    }

    fn context<'h>(heap: &'h Heap, config: &GcConfig, threshold: u8) -> EvacuationContext<'h> {
        heap.retire_mutator_regions();
        let cset = CollectionSet::young_from(heap);
        EvacuationContext::new(heap, config, &cset, 1, threshold, [128, 128])
    }

    #[test]
    fn test_copy_young_object_increments_age() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        let obj = heap.new_instance(0, 2).unwrap();
        heap.store_data(obj, 1, 99).unwrap();
        let ctx = context(&heap, &cfg, 7);
        let mut state = PerThreadEvacuationState::new(&ctx, 0);

        let mark = heap.mark(obj);
        let new = state.copy_to_survivor_space(heap.region_attr(obj), obj, mark);
        assert_ne!(new, obj);
        assert_eq!(heap.forwardee(obj), Some(new));
        assert_eq!(heap.age(new), 1);
        assert_eq!(heap.load_data(new, 1).unwrap(), 99);
        assert_eq!(state.age_table().words_at(1), heap.object_size(new));
        assert!(heap.region_containing(new.index()).is_young());
        assert_eq!(state.surviving_young_words()[1], heap.object_size(new));

        let mut total = vec![0; ctx.young_cset_length() + 1];
        assert_eq!(state.flush(&mut total), heap.object_size(new));
    }

    #[test]
    fn test_old_enough_object_is_promoted() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        let obj = heap.new_instance(0, 1).unwrap();
        heap.set_mark(obj, MarkWord::PROTOTYPE.with_age(3));
        let ctx = context(&heap, &cfg, 3);
        let mut state = PerThreadEvacuationState::new(&ctx, 0);

        let new = state.copy_to_survivor_space(heap.region_attr(obj), obj, heap.mark(obj));
        assert!(heap.region_containing(new.index()).is_old());
        // Promoted copies keep their header
        assert_eq!(heap.age(new), 3);
        assert_eq!(state.age_table().total_words(), 0);
        let mut total = vec![0; ctx.young_cset_length() + 1];
        state.flush(&mut total);
        assert_eq!(ctx.totals().promoted_objects, 1);
    }

    #[test]
    fn test_locked_object_ages_through_displaced_header() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        let obj = heap.new_instance(0, 1).unwrap();
        heap.set_mark(obj, MarkWord::unlocked(42, 2));
        heap.lock(obj).unwrap();
        let locked = heap.mark(obj);
        let ctx = context(&heap, &cfg, 7);
        let mut state = PerThreadEvacuationState::new(&ctx, 0);

        let new = state.copy_to_survivor_space(heap.region_attr(obj), obj, locked);
        assert_eq!(heap.mark(new), locked);
        let displaced = heap.displaced_mark(locked);
        assert_eq!(displaced.age(), 3);
        assert_eq!(displaced.hash(), 42);
        let mut total = vec![0; ctx.young_cset_length() + 1];
        state.flush(&mut total);
    }

    #[test]
    fn test_losing_copy_is_undone() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        let obj = heap.new_instance(0, 4).unwrap();
        let ctx = context(&heap, &cfg, 7);
        let mut winner = PerThreadEvacuationState::new(&ctx, 0);
        let mut loser = PerThreadEvacuationState::new(&ctx, 0);

        // Both read the header before either copies
        let mark = heap.mark(obj);
        let attr = heap.region_attr(obj);
        let first = winner.copy_to_survivor_space(attr, obj, mark);
        let second = loser.copy_to_survivor_space(attr, obj, mark);
        assert_eq!(first, second);
        assert_eq!(loser.plab_allocator().undone_allocations(), 1);
        assert_eq!(loser.surviving_young_words()[1], 0);

        let mut total = vec![0; ctx.young_cset_length() + 1];
        winner.flush(&mut total);
        loser.flush(&mut total);
        assert_eq!(ctx.totals().survivor_objects, 1);
    }

    #[test]
    fn test_fields_are_evacuated_through_queue() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        let parent = heap.new_instance(2, 0).unwrap();
        let left = heap.new_instance(0, 1).unwrap();
        let right = heap.new_instance(0, 1).unwrap();
        heap.store_ref(parent, 0, Some(left)).unwrap();
        heap.store_ref(parent, 1, Some(right)).unwrap();
        let ctx = context(&heap, &cfg, 7);
        let mut state = PerThreadEvacuationState::new(&ctx, 0);

        let root = AtomicU64::new(ObjRef::encode(Some(parent)));
        state.evacuate_root(&root);
        state.evacuate_followers();

        let new_parent = ObjRef::decode(root.load(Ordering::Relaxed)).unwrap();
        assert_ne!(new_parent, parent);
        let new_left = heap.load_ref(new_parent, 0).unwrap().unwrap();
        let new_right = heap.load_ref(new_parent, 1).unwrap().unwrap();
        assert_eq!(heap.forwardee(left), Some(new_left));
        assert_eq!(heap.forwardee(right), Some(new_right));
        let mut total = vec![0; ctx.young_cset_length() + 1];
        state.flush(&mut total);
        assert_eq!(ctx.totals().survivor_objects, 3);
    }

    #[test]
    fn test_large_array_is_scanned_in_chunks() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        let array = heap.new_obj_array(20).unwrap();
        let mut elements = Vec::new();
        for i in 0..20 {
            let e = heap.new_instance(0, 1).unwrap();
            heap.store_ref(array, i, Some(e)).unwrap();
            elements.push(e);
        }
        let ctx = context(&heap, &cfg, 7);
        let mut state = PerThreadEvacuationState::new(&ctx, 0);

        let root = AtomicU64::new(ObjRef::encode(Some(array)));
        state.evacuate_root(&root);
        let new_array = ObjRef::decode(root.load(Ordering::Relaxed)).unwrap();
        // Length hidden until the chunks run
        assert_eq!(heap.array_length(new_array), 0);
        state.evacuate_followers();

        assert_eq!(heap.array_length(new_array), 20);
        for (i, e) in elements.iter().enumerate() {
            let copied = heap.load_ref(new_array, i).unwrap().unwrap();
            assert_eq!(heap.forwardee(*e), Some(copied));
        }
        let mut total = vec![0; ctx.young_cset_length() + 1];
        state.flush(&mut total);
    }

    #[test]
    fn test_flush_publishes_remembered_slots() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        let holder = heap.new_old_instance(1, 0).unwrap();
        let young = heap.new_instance(0, 1).unwrap();
        heap.store_ref(holder, 0, Some(young)).unwrap();
        let slots = heap.remembered_set().take();
        assert_eq!(slots.len(), 1);

        let ctx = context(&heap, &cfg, 7);
        let mut state = PerThreadEvacuationState::new(&ctx, 0);
        state.evacuate_remembered_slot(slots[0]);
        state.evacuate_followers();
        assert!(heap.remembered_set().is_empty());

        let mut total = vec![0; ctx.young_cset_length() + 1];
        state.flush(&mut total);
        assert!(heap.remembered_set().contains(slots[0]));
        let copied = heap.load_ref(holder, 0).unwrap().unwrap();
        assert!(heap.region_containing(copied.index()).is_young());
    }
}
