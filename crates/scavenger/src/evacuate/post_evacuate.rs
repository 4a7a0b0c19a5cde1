//! Post-Evacuation - Leaving the Heap Consistent After Copying
//!
//! Runs on the coordinating thread once every worker state is flushed:
//!
//! 1. Retire the GC alloc regions so survivor and old regions stay parseable
//! 2. Turn regions with failed evacuations into old regions: live
//!    (self-forwarded) objects get their header back, everything else
//!    becomes filler
//! 3. Restore preserved headers
//! 4. Free every other collection-set region
//! 5. Drop remembered slots that no longer point from old into young

use super::{CollectionSet, EvacuationContext};
use crate::heap::{Heap, RegionType};
use crate::object::MarkWord;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostEvacuationSummary {
    /// Collection-set regions returned to the free list
    pub freed_regions: usize,
    /// Regions kept in place as old regions
    pub failed_regions: usize,
    /// Survivor regions allocated during the pause
    pub survivor_regions: usize,
    /// Old regions allocated during the pause
    pub old_regions: usize,
    /// Self-forwarded objects whose header was reset or restored
    pub self_forwarded_objects: usize,
    pub restored_marks: usize,
    /// Remembered slots left for the next pause
    pub remembered_slots: usize,
}

pub fn post_evacuate(
    heap: &Heap,
    cset: &CollectionSet,
    ctx: &EvacuationContext<'_>,
) -> PostEvacuationSummary {
    let mut summary = PostEvacuationSummary::default();

    let [survivor, old] = ctx.allocator().release_gc_alloc_regions();
    summary.survivor_regions = survivor.len();
    summary.old_regions = old.len();

    let failed = ctx.failed_regions();
    for &index in &failed {
        summary.self_forwarded_objects += remove_self_forwards(heap, index);
    }
    summary.failed_regions = failed.len();
    summary.restored_marks = ctx.preserved_marks().restore(heap);

    for &index in cset.regions() {
        let region = heap.region(index);
        if region.evacuation_failed() {
            continue;
        }
        heap.free_region(index);
        summary.freed_regions += 1;
    }
    for &index in &failed {
        heap.region(index).clear_evacuation_failed();
    }
    cset.clear(heap);

    heap.remembered_set().retain(|slot| {
        let region = heap.region_containing(heap.slot_word(slot));
        if region.is_free() || region.is_young() {
            return false;
        }
        heap.load_remembered_slot(slot)
            .map_or(false, |target| heap.region_containing(target.index()).is_young())
    });
    summary.remembered_slots = heap.remembered_set().len();

    log::debug!(
        "Post-evacuation: {} regions freed, {} failed, {} marks restored, {} remembered slots",
        summary.freed_regions,
        summary.failed_regions,
        summary.restored_marks,
        summary.remembered_slots
    );
    summary
}

/// Keep the self-forwarded objects of a failed region and fill the rest
///
/// Returns the number of objects kept.
fn remove_self_forwards(heap: &Heap, index: usize) -> usize {
    let region = heap.region(index);
    let mut kept = 0;
    heap.object_iterate(region, |obj| {
        if heap.mark(obj).forwardee() == Some(obj) {
            heap.set_mark(obj, MarkWord::PROTOTYPE);
            kept += 1;
        } else {
            // Dead, or copied elsewhere by another path
            let size = heap.object_size(obj);
            heap.fill_with_dummy(obj.index(), size);
        }
    });
    region.set_region_type(RegionType::Old);
    region.clear_cset();
    log::debug!("Region {} kept in place with {} live objects", index, kept);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::evacuate::EvacuationStateSet;
    use crate::object::ObjRef;
    use crate::util::constants::KB;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_copied_regions_are_freed() {
        let cfg = GcConfig {
            initial_heap_size: 256 * KB,
            max_heap_size: 256 * KB,
            region_size: 16 * KB,
            gc_threads: Some(1),
            compressed_refs: false,
            young_plab_size: 128,
            old_plab_size: 128,
            min_plab_size: 16,
            ..Default::default()
        };
        let heap = Heap::new(&cfg).unwrap();
        let live = heap.new_instance(0, 2).unwrap();
        heap.new_instance(0, 2).unwrap();
        heap.retire_mutator_regions();
        let eden = heap.region_containing(live.index()).index();
        let cset = CollectionSet::young_from(&heap);
        let ctx = EvacuationContext::new(&heap, &cfg, &cset, 1, 7, [128, 128]);

        let root = AtomicU64::new(ObjRef::encode(Some(live)));
        let mut states = EvacuationStateSet::new(&ctx);
        let state = states.state_for_worker(0);
        state.evacuate_root(&root);
        state.evacuate_followers();
        states.flush();

        let summary = post_evacuate(&heap, &cset, &ctx);
        assert_eq!(summary.freed_regions, 1);
        assert_eq!(summary.failed_regions, 0);
        assert_eq!(summary.survivor_regions, 1);
        assert!(heap.region(eden).is_free());

        let moved = ObjRef::decode(root.load(Ordering::Relaxed)).unwrap();
        let survivor = heap.region_containing(moved.index());
        assert_eq!(survivor.region_type(), RegionType::Survivor);
        assert_eq!(heap.live_words_in(survivor), heap.object_size(moved));
    }
}
