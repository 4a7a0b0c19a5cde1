//! Evacuation State Set - One Lazily Created State per Worker

use super::{EvacuationContext, PerThreadEvacuationState};
use crate::stats::{GcPhase, PhaseTimer, WorkItem};
use crate::util::words_to_bytes;

pub struct EvacuationStateSet<'a> {
    ctx: &'a EvacuationContext<'a>,
    states: Vec<Option<Box<PerThreadEvacuationState<'a>>>>,
    surviving_young_words_total: Vec<usize>,
    flushed: bool,
}

impl<'a> EvacuationStateSet<'a> {
    pub fn new(ctx: &'a EvacuationContext<'a>) -> Self {
        Self {
            ctx,
            states: (0..ctx.workers()).map(|_| None).collect(),
            surviving_young_words_total: vec![0; ctx.young_cset_length() + 1],
            flushed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State of `worker_id`, created on first use
    pub fn state_for_worker(&mut self, worker_id: usize) -> &mut PerThreadEvacuationState<'a> {
        assert!(
            worker_id < self.states.len(),
            "worker {} out of range ({} workers)",
            worker_id,
            self.states.len()
        );
        debug_assert!(!self.flushed, "state set already flushed");
        let ctx = self.ctx;
        self.states[worker_id]
            .get_or_insert_with(|| Box::new(PerThreadEvacuationState::new(ctx, worker_id)))
    }

    /// Create every state and hand out one exclusive borrow per worker
    pub fn all_states(&mut self) -> Vec<&mut PerThreadEvacuationState<'a>> {
        debug_assert!(!self.flushed, "state set already flushed");
        let ctx = self.ctx;
        self.states
            .iter_mut()
            .enumerate()
            .map(|(worker_id, slot)| {
                &mut **slot
                    .get_or_insert_with(|| Box::new(PerThreadEvacuationState::new(ctx, worker_id)))
            })
            .collect()
    }

    /// Flush and drop every state that was created
    pub fn flush(&mut self) {
        debug_assert!(!self.flushed, "state set flushed twice");
        let timer = PhaseTimer::start();
        let mut merged = 0;

        for (worker_id, slot) in self.states.iter_mut().enumerate() {
            let Some(mut state) = slot.take() else {
                continue;
            };
            let waste = state.lab_waste_words();
            let undo_waste = state.lab_undo_waste_words();
            let copied_words = state.flush(&mut self.surviving_young_words_total);

            let mut times = self.ctx.phase_times().lock();
            times.record_or_add_work_item(
                WorkItem::CopiedBytes,
                worker_id,
                words_to_bytes(copied_words),
            );
            times.record_or_add_work_item(
                WorkItem::LabWasteBytes,
                worker_id,
                words_to_bytes(waste),
            );
            times.record_or_add_work_item(
                WorkItem::LabUndoWasteBytes,
                worker_id,
                words_to_bytes(undo_waste),
            );
            merged += 1;
        }

        self.ctx
            .phase_times()
            .lock()
            .record_time_ms(GcPhase::MergePerThreadState, 0, timer.elapsed_ms());
        log::trace!("Merged {} per-thread evacuation states", merged);
        self.flushed = true;
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Words copied out of each young region; index 0 is non-young
    pub fn surviving_young_words(&self) -> &[usize] {
        assert!(self.flushed, "surviving words read before flush");
        &self.surviving_young_words_total
    }
}

impl Drop for EvacuationStateSet<'_> {
    fn drop(&mut self) {
        debug_assert!(
            self.flushed || std::thread::panicking(),
            "evacuation state set dropped without flush"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::evacuate::CollectionSet;
    use crate::heap::Heap;
    use crate::object::ObjRef;
    use crate::util::constants::KB;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn config() -> GcConfig {
        GcConfig {
            initial_heap_size: 256 * KB,
            max_heap_size: 256 * KB,
            region_size: 16 * KB,
            gc_threads: Some(2),
            compressed_refs: false,
            young_plab_size: 128,
            old_plab_size: 128,
            min_plab_size: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_states_are_created_lazily() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        heap.new_instance(0, 1).unwrap();
        heap.retire_mutator_regions();
        let cset = CollectionSet::young_from(&heap);
        let ctx = EvacuationContext::new(&heap, &cfg, &cset, 2, 7, [128, 128]);

        let mut set = EvacuationStateSet::new(&ctx);
        assert_eq!(set.len(), 2);
        assert_eq!(set.state_for_worker(1).worker_id(), 1);
        set.flush();
        assert_eq!(set.surviving_young_words(), &[0, 0]);
    }

    #[test]
    fn test_flush_sums_surviving_words() {
        let cfg = config();
        let heap = Heap::new(&cfg).unwrap();
        let a = heap.new_instance(0, 3).unwrap();
        let b = heap.new_instance(0, 5).unwrap();
        let expected = heap.object_size(a) + heap.object_size(b);
        heap.retire_mutator_regions();
        let cset = CollectionSet::young_from(&heap);
        let ctx = EvacuationContext::new(&heap, &cfg, &cset, 2, 7, [128, 128]);

        let roots = [
            AtomicU64::new(ObjRef::encode(Some(a))),
            AtomicU64::new(ObjRef::encode(Some(b))),
        ];
        let mut set = EvacuationStateSet::new(&ctx);
        for (worker_id, state) in set.all_states().into_iter().enumerate() {
            state.evacuate_root(&roots[worker_id]);
            state.trim_queue();
        }
        set.flush();

        assert_eq!(set.surviving_young_words()[1], expected);
        let times = ctx.phase_times().lock();
        assert_eq!(
            times.work_item_sum(WorkItem::CopiedBytes),
            words_to_bytes(expected)
        );
    }
}
