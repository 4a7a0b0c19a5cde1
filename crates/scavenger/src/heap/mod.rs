//! Heap Module - Region-Based Heap Arena
//!
//! The heap is one reserved array of atomic words divided into fixed-size
//! regions. Only a prefix of the regions is committed; [`Heap::expand_by`]
//! commits more, up to the reserved maximum.
//!
//! ```text
//! word 0          HEAP_BASE                                           reserved end
//! │ null guard │ region 0 │ region 1 │ ... │ region c-1 │ uncommitted ... │
//!                └────────────── committed ─────────────┘
//! ```
//!
//! Every word is an `AtomicU64`, so GC workers and the driver may share
//! `&Heap` freely; forwarding and header updates use CAS, payload copies use
//! relaxed loads and stores published through the task queues.

pub mod monitor;
pub mod numa;
pub mod region;
pub mod remset;

pub use monitor::MonitorTable;
pub use numa::{NumaStats, NumaTopology};
pub use region::{Destination, Region, RegionAttr, RegionType};
pub use remset::RememberedSet;

use crate::config::GcConfig;
use crate::error::{Result, ScavengeError};
use crate::object::{
    object_size, KlassWord, MarkWord, ObjRef, ObjectKind, ARRAY_HEADER_WORDS, HEADER_WORDS,
    MAX_ARRAY_LENGTH,
};
use crate::util::words_to_bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Words below the first region; word 0 doubles as null
pub const HEAP_BASE: usize = 8;

/// Region-based heap arena
pub struct Heap {
    words: Box<[AtomicU64]>,
    regions: Box<[Region]>,
    region_words: usize,
    log_region_words: u32,
    committed_regions: AtomicUsize,
    initial_regions: usize,
    free_regions: Mutex<BTreeSet<usize>>,
    eden_region: Mutex<Option<usize>>,
    old_region: Mutex<Option<usize>>,
    compressed_refs: bool,
    numa: NumaTopology,
    monitors: MonitorTable,
    remset: RememberedSet,
}

impl Heap {
    /// Reserve the arena and commit the initial regions
    pub fn new(config: &GcConfig) -> Result<Self> {
        config.validate()?;

        let region_words = config.region_words();
        let max_regions = config.max_regions();
        let initial_regions = config.initial_regions().min(max_regions);
        let numa = NumaTopology::new(config.numa_nodes);

        let total_words = HEAP_BASE + max_regions * region_words;
        let words: Box<[AtomicU64]> = (0..total_words).map(|_| AtomicU64::new(0)).collect();
        let regions: Box<[Region]> = (0..max_regions)
            .map(|i| {
                Region::new(
                    i,
                    HEAP_BASE + i * region_words,
                    region_words,
                    numa.node_of_region(i),
                )
            })
            .collect();

        log::debug!(
            "Heap reserved: {} regions of {} words, {} committed",
            max_regions,
            region_words,
            initial_regions
        );

        Ok(Self {
            words,
            regions,
            region_words,
            log_region_words: region_words.trailing_zeros(),
            committed_regions: AtomicUsize::new(initial_regions),
            initial_regions,
            free_regions: Mutex::new((0..initial_regions).collect()),
            eden_region: Mutex::new(None),
            old_region: Mutex::new(None),
            compressed_refs: config.compressed_refs,
            numa,
            monitors: MonitorTable::new(config.monitor_slots),
            remset: RememberedSet::new(),
        })
    }

    // ------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn word(&self, index: usize) -> &AtomicU64 {
        &self.words[index]
    }

    #[inline]
    pub fn compressed_refs(&self) -> bool {
        self.compressed_refs
    }

    pub fn numa(&self) -> &NumaTopology {
        &self.numa
    }

    pub fn monitors(&self) -> &MonitorTable {
        &self.monitors
    }

    pub fn remembered_set(&self) -> &RememberedSet {
        &self.remset
    }

    pub fn region_words(&self) -> usize {
        self.region_words
    }

    pub fn region_bytes(&self) -> usize {
        words_to_bytes(self.region_words)
    }

    pub fn max_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn committed_regions(&self) -> usize {
        self.committed_regions.load(Ordering::Acquire)
    }

    /// Committed bytes
    pub fn capacity_bytes(&self) -> usize {
        self.committed_regions() * self.region_bytes()
    }

    /// Reserved bytes
    pub fn max_capacity_bytes(&self) -> usize {
        self.max_regions() * self.region_bytes()
    }

    pub fn initial_capacity_bytes(&self) -> usize {
        self.initial_regions * self.region_bytes()
    }

    pub fn region(&self, index: usize) -> &Region {
        &self.regions[index]
    }

    /// Region containing heap word `word`
    #[inline]
    pub fn region_containing(&self, word: usize) -> &Region {
        debug_assert!(word >= HEAP_BASE, "word {:#x} below heap base", word);
        &self.regions[(word - HEAP_BASE) >> self.log_region_words]
    }

    #[inline]
    pub fn region_attr(&self, obj: ObjRef) -> RegionAttr {
        self.region_containing(obj.index()).attr()
    }

    /// Committed regions in index order
    pub fn committed(&self) -> impl Iterator<Item = &Region> {
        self.regions[..self.committed_regions()].iter()
    }

    pub fn used_words(&self) -> usize {
        self.committed().map(Region::used_words).sum()
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            committed_bytes: self.capacity_bytes(),
            max_bytes: self.max_capacity_bytes(),
            ..Default::default()
        };
        for region in self.committed() {
            stats.used_bytes += words_to_bytes(region.used_words());
            match region.region_type() {
                RegionType::Free => stats.free_regions += 1,
                RegionType::Eden => stats.eden_regions += 1,
                RegionType::Survivor => stats.survivor_regions += 1,
                RegionType::Old => stats.old_regions += 1,
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // Region management
    // ------------------------------------------------------------------

    /// Commit enough regions to cover `bytes`, bounded by the reservation
    ///
    /// Returns the number of regions committed.
    pub fn expand_by(&self, bytes: usize) -> usize {
        let mut free = self.free_regions.lock();
        let committed = self.committed_regions();
        let wanted = bytes.div_ceil(self.region_bytes());
        let added = wanted.min(self.max_regions() - committed);
        if added == 0 {
            return 0;
        }
        free.extend(committed..committed + added);
        self.committed_regions
            .store(committed + added, Ordering::Release);
        log::debug!(
            "Heap expanded by {} regions ({} -> {} bytes)",
            added,
            committed * self.region_bytes(),
            (committed + added) * self.region_bytes()
        );
        added
    }

    /// Take a free region, preferring one on `node`
    pub fn take_free_region(&self, node: Option<usize>) -> Option<usize> {
        let mut free = self.free_regions.lock();
        let chosen = node
            .and_then(|node| {
                free.iter()
                    .copied()
                    .find(|&i| self.regions[i].numa_node() == node)
            })
            .or_else(|| free.iter().next().copied())?;
        free.remove(&chosen);
        Some(chosen)
    }

    /// Reset a region and put it back on the free list
    ///
    /// An evacuated old region may still be the mutator's old allocation
    /// region; it stops being one here.
    pub fn free_region(&self, index: usize) {
        {
            let mut old = self.old_region.lock();
            if *old == Some(index) {
                *old = None;
            }
        }
        self.regions[index].reset();
        self.free_regions.lock().insert(index);
    }

    pub fn free_region_count(&self) -> usize {
        self.free_regions.lock().len()
    }

    /// Retire the current eden allocation region before a pause
    pub fn retire_mutator_regions(&self) {
        if let Some(index) = self.eden_region.lock().take() {
            self.retire_region_tail(&self.regions[index]);
        }
    }

    /// Fill the unallocated tail of a region so it stays parseable
    pub(crate) fn retire_region_tail(&self, region: &Region) {
        let free = region.free_words();
        if free > 0 {
            if let Some(start) = region.allocate(free) {
                self.fill_with_dummy(start, free);
            }
        }
    }

    // ------------------------------------------------------------------
    // Mutator allocation
    // ------------------------------------------------------------------

    /// Allocate an instance in eden
    pub fn new_instance(&self, ref_fields: u32, data_words: u32) -> Result<ObjRef> {
        self.allocate_object(
            ObjectKind::Instance {
                ref_fields,
                data_words,
            },
            0,
            RegionType::Eden,
        )
    }

    /// Allocate an array of `length` references in eden
    pub fn new_obj_array(&self, length: usize) -> Result<ObjRef> {
        self.allocate_object(ObjectKind::ObjArray, length, RegionType::Eden)
    }

    /// Allocate an array of `length` primitive words in eden
    pub fn new_type_array(&self, length: usize) -> Result<ObjRef> {
        self.allocate_object(ObjectKind::TypeArray, length, RegionType::Eden)
    }

    /// Allocate an instance directly in an old region
    pub fn new_old_instance(&self, ref_fields: u32, data_words: u32) -> Result<ObjRef> {
        self.allocate_object(
            ObjectKind::Instance {
                ref_fields,
                data_words,
            },
            0,
            RegionType::Old,
        )
    }

    /// Allocate a reference array directly in an old region
    pub fn new_old_obj_array(&self, length: usize) -> Result<ObjRef> {
        self.allocate_object(ObjectKind::ObjArray, length, RegionType::Old)
    }

    fn allocate_object(
        &self,
        kind: ObjectKind,
        length: usize,
        region_type: RegionType,
    ) -> Result<ObjRef> {
        if length > MAX_ARRAY_LENGTH {
            return Err(ScavengeError::ObjectTooLarge {
                words: length,
                region_words: self.region_words,
            });
        }
        let words = object_size(kind, length, self.compressed_refs);
        if words > self.region_words {
            return Err(ScavengeError::ObjectTooLarge {
                words,
                region_words: self.region_words,
            });
        }

        let current = match region_type {
            RegionType::Old => &self.old_region,
            _ => &self.eden_region,
        };
        let mut current = current.lock();
        let start = loop {
            if let Some(index) = *current {
                if let Some(start) = self.regions[index].allocate(words) {
                    break start;
                }
                self.retire_region_tail(&self.regions[index]);
            }
            let index = self
                .take_free_region(None)
                .ok_or_else(|| ScavengeError::OutOfMemory {
                    requested: words,
                    free_regions: 0,
                })?;
            self.regions[index].set_region_type(region_type);
            *current = Some(index);
        };

        self.initialize_object(start, kind, length, words);
        ObjRef::from_index(start).ok_or(ScavengeError::InvalidReference(start))
    }

    /// Write a header and clear the body of a new object
    pub(crate) fn initialize_object(&self, start: usize, kind: ObjectKind, length: usize, words: usize) {
        let klass = match kind {
            ObjectKind::Instance {
                ref_fields,
                data_words,
            } => KlassWord::instance(ref_fields, data_words),
            ObjectKind::ObjArray => KlassWord::obj_array(),
            ObjectKind::TypeArray => KlassWord::type_array(),
            ObjectKind::Filler { words } => KlassWord::filler(words),
        };
        for i in start + 1..start + words {
            self.words[i].store(0, Ordering::Relaxed);
        }
        self.words[start + 1].store(klass.raw(), Ordering::Relaxed);
        if kind.is_array() {
            self.words[start + 2].store(length as u64, Ordering::Relaxed);
        }
        self.words[start].store(MarkWord::PROTOTYPE.raw(), Ordering::Release);
    }

    /// Turn `words` words at `start` into dead space
    pub fn fill_with_dummy(&self, start: usize, words: usize) {
        debug_assert!(words > 0);
        if words == 1 {
            self.words[start].store(MarkWord::FILLER.raw(), Ordering::Relaxed);
        } else {
            self.words[start + 1].store(KlassWord::filler(words).raw(), Ordering::Relaxed);
            self.words[start].store(MarkWord::PROTOTYPE.raw(), Ordering::Relaxed);
        }
    }

    // ------------------------------------------------------------------
    // Headers and shape
    // ------------------------------------------------------------------

    #[inline]
    pub fn mark(&self, obj: ObjRef) -> MarkWord {
        MarkWord::from_raw(self.words[obj.index()].load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_mark(&self, obj: ObjRef, mark: MarkWord) {
        self.words[obj.index()].store(mark.raw(), Ordering::Release);
    }

    /// Install a forwarding reference to `to` if the header is still `old_mark`
    ///
    /// Returns `None` when this call installed it, otherwise the forwardee
    /// installed by the winner.
    #[inline]
    pub fn forward_to_atomic(&self, obj: ObjRef, to: ObjRef, old_mark: MarkWord) -> Option<ObjRef> {
        match self.words[obj.index()].compare_exchange(
            old_mark.raw(),
            MarkWord::forwarding_to(to).raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => None,
            Err(current) => {
                let current = MarkWord::from_raw(current);
                debug_assert!(current.is_marked(), "header changed without forwarding");
                current.forwardee()
            }
        }
    }

    pub fn forwardee(&self, obj: ObjRef) -> Option<ObjRef> {
        self.mark(obj).forwardee()
    }

    pub fn is_forwarded(&self, obj: ObjRef) -> bool {
        self.mark(obj).is_marked()
    }

    /// Real header of an object whose header is locked
    pub fn displaced_mark(&self, mark: MarkWord) -> MarkWord {
        self.monitors.displaced(mark.monitor_slot())
    }

    pub fn set_displaced_mark(&self, mark: MarkWord, displaced: MarkWord) {
        self.monitors.set_displaced(mark.monitor_slot(), displaced)
    }

    /// Unlocked header of `obj`, looking through a lock if present
    pub fn header(&self, obj: ObjRef) -> MarkWord {
        let mark = self.mark(obj);
        if mark.has_displaced_mark() {
            self.displaced_mark(mark)
        } else {
            mark
        }
    }

    /// GC age of `obj`
    pub fn age(&self, obj: ObjRef) -> u8 {
        self.header(obj).age()
    }

    #[inline]
    pub fn kind(&self, obj: ObjRef) -> ObjectKind {
        KlassWord::from_raw(self.words[obj.index() + 1].load(Ordering::Relaxed)).kind()
    }

    #[inline]
    pub fn array_length(&self, obj: ObjRef) -> usize {
        debug_assert!(self.kind(obj).is_array());
        self.words[obj.index() + 2].load(Ordering::Relaxed) as usize
    }

    #[inline]
    pub fn set_array_length(&self, obj: ObjRef, length: usize) {
        debug_assert!(self.kind(obj).is_array());
        self.words[obj.index() + 2].store(length as u64, Ordering::Relaxed);
    }

    /// Size in words, using the current array length
    #[inline]
    pub fn object_size(&self, obj: ObjRef) -> usize {
        let kind = self.kind(obj);
        let length = if kind.is_array() {
            self.array_length(obj)
        } else {
            0
        };
        object_size(kind, length, self.compressed_refs)
    }

    /// Number of reference slots of `obj`
    pub fn ref_count(&self, obj: ObjRef) -> usize {
        match self.kind(obj) {
            ObjectKind::Instance { ref_fields, .. } => ref_fields as usize,
            ObjectKind::ObjArray => self.array_length(obj),
            _ => 0,
        }
    }

    /// Slot addresses of reference slots `[from, to)` of `obj`
    #[inline]
    pub fn ref_slot_range(&self, obj: ObjRef, from: usize, to: usize) -> Range<usize> {
        let first_word = match self.kind(obj) {
            ObjectKind::ObjArray => obj.offset(ARRAY_HEADER_WORDS),
            _ => obj.offset(HEADER_WORDS),
        };
        if self.compressed_refs {
            first_word * 2 + from..first_word * 2 + to
        } else {
            first_word + from..first_word + to
        }
    }

    /// Copy `words` words from `from` to `to`
    #[inline]
    pub fn copy_words(&self, from: usize, to: usize, words: usize) {
        for i in 0..words {
            let value = self.words[from + i].load(Ordering::Relaxed);
            self.words[to + i].store(value, Ordering::Relaxed);
        }
    }

    // ------------------------------------------------------------------
    // Mutator field access
    // ------------------------------------------------------------------

    fn check_object(&self, obj: ObjRef) -> Result<()> {
        let index = obj.index();
        if index < HEAP_BASE {
            return Err(ScavengeError::InvalidReference(index));
        }
        let region_index = (index - HEAP_BASE) >> self.log_region_words;
        if region_index >= self.committed_regions() || index >= self.regions[region_index].top() {
            return Err(ScavengeError::InvalidReference(index));
        }
        Ok(())
    }

    fn slot_address(&self, obj: ObjRef, index: usize) -> Result<usize> {
        self.check_object(obj)?;
        let kind = self.kind(obj);
        if !matches!(kind, ObjectKind::Instance { .. } | ObjectKind::ObjArray) {
            return Err(ScavengeError::WrongObjectKind {
                expected: "instance or object array",
                found: kind.name(),
            });
        }
        let length = self.ref_count(obj);
        if index >= length {
            return Err(ScavengeError::FieldOutOfBounds { index, length });
        }
        Ok(self.ref_slot_range(obj, index, index + 1).start)
    }

    fn load_slot(&self, address: usize) -> Option<ObjRef> {
        use crate::object::{NarrowSlot, RefSlot, WideSlot};
        if self.compressed_refs {
            NarrowSlot(address).load(self)
        } else {
            WideSlot(address).load(self)
        }
    }

    fn store_slot(&self, address: usize, value: Option<ObjRef>) {
        use crate::object::{NarrowSlot, RefSlot, WideSlot};
        if self.compressed_refs {
            NarrowSlot(address).store(self, value)
        } else {
            WideSlot(address).store(self, value)
        }
    }

    /// Heap word containing the slot at `address`
    #[inline]
    pub fn slot_word(&self, address: usize) -> usize {
        if self.compressed_refs {
            address >> 1
        } else {
            address
        }
    }

    /// Read reference field or element `index` of `obj`
    pub fn load_ref(&self, obj: ObjRef, index: usize) -> Result<Option<ObjRef>> {
        let address = self.slot_address(obj, index)?;
        Ok(self.load_slot(address))
    }

    /// Write reference field or element `index` of `obj`
    ///
    /// Old-to-young stores are recorded in the remembered set.
    pub fn store_ref(&self, obj: ObjRef, index: usize, value: Option<ObjRef>) -> Result<()> {
        let address = self.slot_address(obj, index)?;
        if let Some(target) = value {
            self.check_object(target)?;
            let holder = self.region_containing(obj.index());
            if !holder.is_young() && self.region_containing(target.index()).is_young() {
                self.remset.record(address);
            }
        }
        self.store_slot(address, value);
        Ok(())
    }

    /// Reference stored at a remembered-set slot address
    pub fn load_remembered_slot(&self, address: usize) -> Option<ObjRef> {
        self.load_slot(address)
    }

    fn data_word(&self, obj: ObjRef, index: usize) -> Result<usize> {
        self.check_object(obj)?;
        let (first, length) = match self.kind(obj) {
            ObjectKind::Instance {
                ref_fields,
                data_words,
            } => (
                obj.offset(HEADER_WORDS)
                    + crate::object::ref_area_words(ref_fields as usize, self.compressed_refs),
                data_words as usize,
            ),
            ObjectKind::TypeArray => (obj.offset(ARRAY_HEADER_WORDS), self.array_length(obj)),
            kind => {
                return Err(ScavengeError::WrongObjectKind {
                    expected: "instance or type array",
                    found: kind.name(),
                })
            }
        };
        if index >= length {
            return Err(ScavengeError::FieldOutOfBounds { index, length });
        }
        Ok(first + index)
    }

    /// Read primitive word `index` of `obj`
    pub fn load_data(&self, obj: ObjRef, index: usize) -> Result<u64> {
        let word = self.data_word(obj, index)?;
        Ok(self.words[word].load(Ordering::Relaxed))
    }

    /// Write primitive word `index` of `obj`
    pub fn store_data(&self, obj: ObjRef, index: usize, value: u64) -> Result<()> {
        let word = self.data_word(obj, index)?;
        self.words[word].store(value, Ordering::Relaxed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Identity hash and locking
    // ------------------------------------------------------------------

    /// Identity hash of `obj`, installing one on first use
    pub fn identity_hash(&self, obj: ObjRef) -> Result<u32> {
        self.check_object(obj)?;
        let mark = self.mark(obj);
        if mark.has_displaced_mark() {
            let displaced = self.displaced_mark(mark);
            if displaced.hash() != 0 {
                return Ok(displaced.hash());
            }
            let hash = Self::next_hash();
            self.set_displaced_mark(mark, displaced.with_hash(hash));
            return Ok(hash);
        }
        if mark.hash() != 0 {
            return Ok(mark.hash());
        }
        let hash = Self::next_hash();
        self.set_mark(obj, mark.with_hash(hash));
        Ok(hash)
    }

    fn next_hash() -> u32 {
        rand::thread_rng().gen_range(1..=u32::MAX)
    }

    /// Stack-lock `obj`, displacing its header into the monitor table
    pub fn lock(&self, obj: ObjRef) -> Result<()> {
        self.check_object(obj)?;
        let mark = self.mark(obj);
        if !mark.is_unlocked() {
            return Err(ScavengeError::InvalidLockState(format!(
                "{:?} is already locked",
                obj
            )));
        }
        let slot = self.monitors.claim(mark)?;
        self.set_mark(obj, MarkWord::stack_locked(slot));
        Ok(())
    }

    /// Inflate the lock of a stack-locked object
    pub fn inflate(&self, obj: ObjRef) -> Result<()> {
        self.check_object(obj)?;
        let mark = self.mark(obj);
        if !mark.has_displaced_mark() {
            return Err(ScavengeError::InvalidLockState(format!(
                "{:?} is not locked",
                obj
            )));
        }
        self.set_mark(obj, MarkWord::inflated(mark.monitor_slot()));
        Ok(())
    }

    /// Release the lock, restoring the displaced header
    pub fn unlock(&self, obj: ObjRef) -> Result<()> {
        self.check_object(obj)?;
        let mark = self.mark(obj);
        if !mark.has_displaced_mark() {
            return Err(ScavengeError::InvalidLockState(format!(
                "{:?} is not locked",
                obj
            )));
        }
        self.set_mark(obj, self.displaced_mark(mark));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Region walking
    // ------------------------------------------------------------------

    /// Visit every object in `region` from bottom to top, skipping fillers
    pub fn object_iterate<F: FnMut(ObjRef)>(&self, region: &Region, mut f: F) {
        let mut cur = region.bottom();
        let top = region.top();
        while cur < top {
            let mark = MarkWord::from_raw(self.words[cur].load(Ordering::Relaxed));
            if mark.is_filler() {
                cur += 1;
                continue;
            }
            let Some(obj) = ObjRef::from_index(cur) else {
                break;
            };
            let size = self.object_size(obj);
            debug_assert!(size > 0, "zero-sized object at {:#x}", cur);
            if !matches!(self.kind(obj), ObjectKind::Filler { .. }) {
                f(obj);
            }
            cur += size.max(1);
        }
    }

    /// Total words of objects (not fillers) in `region`
    pub fn live_words_in(&self, region: &Region) -> usize {
        let mut words = 0;
        self.object_iterate(region, |obj| words += self.object_size(obj));
        words
    }
}

/// Heap occupancy snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub committed_bytes: usize,
    pub max_bytes: usize,
    pub used_bytes: usize,
    pub free_regions: usize,
    pub eden_regions: usize,
    pub survivor_regions: usize,
    pub old_regions: usize,
}

impl HeapStats {
    pub fn utilization_percent(&self) -> f64 {
        crate::util::percent_of(self.used_bytes, self.committed_bytes)
    }

    pub fn uncommitted_bytes(&self) -> usize {
        self.max_bytes - self.committed_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::KB;

    fn small_heap(compressed: bool) -> Heap {
        let config = GcConfig {
            initial_heap_size: 64 * KB,
            max_heap_size: 256 * KB,
            region_size: 16 * KB,
            compressed_refs: compressed,
            young_plab_size: 256,
            old_plab_size: 256,
            min_plab_size: 16,
            ..Default::default()
        };
        Heap::new(&config).unwrap()
    }

    #[test]
    fn test_new_heap_geometry() {
        let heap = small_heap(true);
        assert_eq!(heap.committed_regions(), 4);
        assert_eq!(heap.max_regions(), 16);
        assert_eq!(heap.free_region_count(), 4);
        assert_eq!(heap.capacity_bytes(), 64 * KB);
        assert_eq!(heap.region(1).bottom(), HEAP_BASE + 2 * KB);
    }

    #[test]
    fn test_allocate_and_access_fields() {
        for compressed in [false, true] {
            let heap = small_heap(compressed);
            let a = heap.new_instance(3, 2).unwrap();
            let b = heap.new_instance(0, 1).unwrap();
            heap.store_ref(a, 1, Some(b)).unwrap();
            heap.store_ref(a, 2, Some(a)).unwrap();
            heap.store_data(a, 1, 77).unwrap();
            assert_eq!(heap.load_ref(a, 0).unwrap(), None);
            assert_eq!(heap.load_ref(a, 1).unwrap(), Some(b));
            assert_eq!(heap.load_ref(a, 2).unwrap(), Some(a));
            assert_eq!(heap.load_data(a, 1).unwrap(), 77);
            assert!(matches!(
                heap.load_ref(a, 3),
                Err(ScavengeError::FieldOutOfBounds { index: 3, length: 3 })
            ));
            assert!(heap.region_containing(a.index()).is_young());
        }
    }

    #[test]
    fn test_arrays() {
        let heap = small_heap(true);
        let arr = heap.new_obj_array(5).unwrap();
        let data = heap.new_type_array(4).unwrap();
        assert_eq!(heap.array_length(arr), 5);
        assert_eq!(heap.object_size(arr), 3 + 3);
        assert_eq!(heap.object_size(data), 3 + 4);
        heap.store_ref(arr, 4, Some(data)).unwrap();
        assert_eq!(heap.load_ref(arr, 4).unwrap(), Some(data));
        assert!(heap.store_ref(data, 0, Some(arr)).is_err());
    }

    #[test]
    fn test_old_to_young_store_is_remembered() {
        let heap = small_heap(false);
        let old = heap.new_old_instance(2, 0).unwrap();
        let young = heap.new_instance(0, 0).unwrap();
        heap.store_ref(old, 1, Some(young)).unwrap();
        assert_eq!(heap.remembered_set().len(), 1);
        assert_eq!(
            heap.load_remembered_slot(heap.remembered_set().take()[0]),
            Some(young)
        );
    }

    #[test]
    fn test_forward_to_atomic_single_winner() {
        let heap = small_heap(true);
        let obj = heap.new_instance(0, 0).unwrap();
        let to1 = heap.new_instance(0, 0).unwrap();
        let to2 = heap.new_instance(0, 0).unwrap();
        let old = heap.mark(obj);
        assert_eq!(heap.forward_to_atomic(obj, to1, old), None);
        assert_eq!(heap.forward_to_atomic(obj, to2, old), Some(to1));
        assert_eq!(heap.forwardee(obj), Some(to1));
    }

    #[test]
    fn test_locking_displaces_header() {
        let heap = small_heap(true);
        let obj = heap.new_instance(0, 0).unwrap();
        let hash = heap.identity_hash(obj).unwrap();
        heap.lock(obj).unwrap();
        assert!(heap.mark(obj).has_displaced_mark());
        assert_eq!(heap.header(obj).hash(), hash);
        heap.inflate(obj).unwrap();
        heap.unlock(obj).unwrap();
        assert!(heap.mark(obj).is_unlocked());
        assert_eq!(heap.identity_hash(obj).unwrap(), hash);
    }

    #[test]
    fn test_object_iterate_skips_fillers() {
        let heap = small_heap(true);
        let a = heap.new_instance(1, 0).unwrap();
        let b = heap.new_type_array(2).unwrap();
        heap.retire_mutator_regions();
        let region = heap.region_containing(a.index());
        let mut seen = Vec::new();
        heap.object_iterate(region, |obj| seen.push(obj));
        assert_eq!(seen, vec![a, b]);
        assert_eq!(region.free_words(), 0);
    }

    #[test]
    fn test_expand_by_bounded_by_reservation() {
        let heap = small_heap(true);
        assert_eq!(heap.expand_by(20 * KB), 2);
        assert_eq!(heap.committed_regions(), 6);
        assert_eq!(heap.expand_by(usize::MAX / 2), 10);
        assert_eq!(heap.expand_by(KB), 0);
        assert_eq!(heap.capacity_bytes(), heap.max_capacity_bytes());
    }

    #[test]
    fn test_object_too_large() {
        let heap = small_heap(false);
        assert!(matches!(
            heap.new_type_array(4 * KB),
            Err(ScavengeError::ObjectTooLarge { .. })
        ));
    }

    #[test]
    fn test_take_free_region_prefers_node() {
        let config = GcConfig {
            initial_heap_size: 64 * KB,
            max_heap_size: 256 * KB,
            region_size: 16 * KB,
            numa_nodes: 2,
            young_plab_size: 256,
            old_plab_size: 256,
            min_plab_size: 16,
            ..Default::default()
        };
        let heap = Heap::new(&config).unwrap();
        assert_eq!(heap.take_free_region(Some(1)), Some(1));
        assert_eq!(heap.take_free_region(Some(1)), Some(3));
        assert_eq!(heap.take_free_region(Some(1)), Some(0));
    }
}
