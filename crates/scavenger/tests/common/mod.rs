//! Test Utilities for the Scavenger Test Suite
//!
//! Fixtures build small heaps and object graphs; the verifier walks
//! everything reachable from the roots after a pause and checks that no
//! reference was left pointing at a stale copy.

#![allow(dead_code)]

use scavenger::heap::RegionAttr;
use scavenger::object::ObjectKind;
use scavenger::{GarbageCollector, GcConfig, Heap, ObjRef, RootSet};
use std::collections::{HashSet, VecDeque};

pub const KB: usize = 1024;

/// Small heap with 16KB regions, room to expand
pub fn small_config(workers: usize) -> GcConfig {
    GcConfig {
        initial_heap_size: 512 * KB,
        max_heap_size: 2048 * KB,
        region_size: 16 * KB,
        gc_threads: Some(workers),
        young_plab_size: 128,
        old_plab_size: 128,
        min_plab_size: 16,
        partial_array_chunk: 8,
        ..Default::default()
    }
}

/// Test fixture owning a collector and its roots
pub struct GcFixture {
    pub gc: GarbageCollector,
    pub roots: RootSet,
}

impl GcFixture {
    pub fn new(config: GcConfig) -> Self {
        Self {
            gc: GarbageCollector::new(config).expect("valid test configuration"),
            roots: RootSet::new(),
        }
    }

    pub fn with_workers(workers: usize) -> Self {
        Self::new(small_config(workers))
    }

    pub fn heap(&self) -> &Heap {
        self.gc.heap()
    }

    /// Instance with `refs` reference fields and `id` in its first data word
    pub fn tagged(&self, refs: u32, id: u64) -> ObjRef {
        let obj = self.heap().new_instance(refs, 1).expect("eden space");
        self.heap().store_data(obj, 0, id).unwrap();
        obj
    }

    pub fn root(&mut self, obj: ObjRef) -> usize {
        self.roots.add(Some(obj))
    }
}

/// Build a complete binary tree of tagged nodes; ids are `first_id..`
///
/// Returns the root node and the number of nodes created.
pub fn binary_tree(heap: &Heap, depth: u32, first_id: u64) -> (ObjRef, usize) {
    let node = heap.new_instance(2, 1).expect("eden space");
    heap.store_data(node, 0, first_id).unwrap();
    if depth == 0 {
        return (node, 1);
    }
    let (left, left_count) = binary_tree(heap, depth - 1, first_id + 1);
    let (right, right_count) = binary_tree(heap, depth - 1, first_id + 1 + left_count as u64);
    heap.store_ref(node, 0, Some(left)).unwrap();
    heap.store_ref(node, 1, Some(right)).unwrap();
    (node, 1 + left_count + right_count)
}

/// Singly linked list of `len` tagged nodes; ids are `first_id..`
pub fn linked_list(heap: &Heap, len: usize, first_id: u64) -> ObjRef {
    let mut next: Option<ObjRef> = None;
    for i in (0..len).rev() {
        let node = heap.new_instance(1, 1).expect("eden space");
        heap.store_data(node, 0, first_id + i as u64).unwrap();
        heap.store_ref(node, 0, next).unwrap();
        next = Some(node);
    }
    next.expect("non-empty list")
}

/// Every object reachable from `roots`, in breadth-first order
///
/// Panics if a reachable object is still forwarded, sits in a free region
/// or is still tagged as part of a collection set.
pub fn verify_reachable(heap: &Heap, roots: &RootSet) -> Vec<ObjRef> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue: VecDeque<ObjRef> = (0..roots.len()).filter_map(|h| roots.get(h)).collect();

    while let Some(obj) = queue.pop_front() {
        if !seen.insert(obj) {
            continue;
        }
        assert!(!heap.is_forwarded(obj), "{:?} is still forwarded", obj);
        let region = heap.region_containing(obj.index());
        assert!(!region.is_free(), "{:?} lives in free region {}", obj, region.index());
        assert_eq!(region.attr(), RegionAttr::NotInCset, "{:?} still in cset", obj);
        order.push(obj);

        let count = match heap.kind(obj) {
            ObjectKind::Instance { ref_fields, .. } => ref_fields as usize,
            ObjectKind::ObjArray => heap.array_length(obj),
            _ => 0,
        };
        for i in 0..count {
            if let Some(child) = heap.load_ref(obj, i).unwrap() {
                queue.push_back(child);
            }
        }
    }
    order
}

/// First data word of every reachable tagged instance, sorted
pub fn reachable_ids(heap: &Heap, roots: &RootSet) -> Vec<u64> {
    let mut ids: Vec<u64> = verify_reachable(heap, roots)
        .into_iter()
        .filter(|&o| matches!(heap.kind(o), ObjectKind::Instance { data_words, .. } if data_words > 0))
        .map(|o| heap.load_data(o, 0).unwrap())
        .collect();
    ids.sort_unstable();
    ids
}
