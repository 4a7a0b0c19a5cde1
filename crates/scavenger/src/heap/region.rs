//! Region Implementation - Unit of Heap Management
//!
//! A region is a fixed-size, contiguous run of heap words with its own bump
//! pointer. Regions move through a small lifecycle:
//!
//! ```text
//!            mutator alloc          pause: in cset
//! Free ──▶ Eden ─────────────────▶ (evacuated) ──▶ Free
//!   │                                   │
//!   │      GC alloc (survivor)          │ evacuation failed
//!   ├────▶ Survivor ──▶ (next pause) ───┤
//!   │                                   ▼
//!   └────▶ Old ◀────────────────────────┘
//! ```
//!
//! # Memory Ordering Model
//!
//! - **top:** region-level allocation happens under the allocator's mutex;
//!   `Relaxed` loads suffice for sizing queries made during the pause.
//! - **type / collection-set attribute:** written by the driver before
//!   workers are spawned and after they are joined; thread spawn and join
//!   provide the ordering.
//! - **evacuation_failed:** set with a `swap` so exactly one worker observes
//!   the first failure of a region.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Region lifecycle type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RegionType {
    Free = 0,
    Eden = 1,
    Survivor = 2,
    Old = 3,
}

impl RegionType {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RegionType::Eden,
            2 => RegionType::Survivor,
            3 => RegionType::Old,
            _ => RegionType::Free,
        }
    }

    pub fn is_young(self) -> bool {
        matches!(self, RegionType::Eden | RegionType::Survivor)
    }
}

/// Collection-set membership of a region for the current pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RegionAttr {
    NotInCset = 0,
    Young = 1,
    Old = 2,
}

impl RegionAttr {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RegionAttr::Young,
            2 => RegionAttr::Old,
            _ => RegionAttr::NotInCset,
        }
    }

    #[inline]
    pub fn is_in_cset(self) -> bool {
        self != RegionAttr::NotInCset
    }

    #[inline]
    pub fn is_young(self) -> bool {
        self == RegionAttr::Young
    }
}

/// Generation an evacuated object is copied into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Young,
    Old,
}

impl Destination {
    pub const COUNT: usize = 2;
    pub const ALL: [Destination; 2] = [Destination::Young, Destination::Old];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Destination::Young => 0,
            Destination::Old => 1,
        }
    }

    pub fn region_type(self) -> RegionType {
        match self {
            Destination::Young => RegionType::Survivor,
            Destination::Old => RegionType::Old,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Destination::Young => "young",
            Destination::Old => "old",
        }
    }
}

/// Region - unit of heap management
pub struct Region {
    index: usize,

    /// First word of the region
    bottom: usize,

    /// One past the last word
    end: usize,

    /// Bump pointer
    top: AtomicUsize,

    region_type: AtomicU8,

    attr: AtomicU8,

    /// Dense 1-based index among young collection-set regions, 0 otherwise
    young_index: AtomicUsize,

    evacuation_failed: AtomicBool,

    numa_node: usize,
}

impl Region {
    pub fn new(index: usize, bottom: usize, words: usize, numa_node: usize) -> Self {
        Self {
            index,
            bottom,
            end: bottom + words,
            top: AtomicUsize::new(bottom),
            region_type: AtomicU8::new(RegionType::Free as u8),
            attr: AtomicU8::new(RegionAttr::NotInCset as u8),
            young_index: AtomicUsize::new(0),
            evacuation_failed: AtomicBool::new(false),
            numa_node,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bottom(&self) -> usize {
        self.bottom
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn top(&self) -> usize {
        self.top.load(Ordering::Relaxed)
    }

    pub fn capacity_words(&self) -> usize {
        self.end - self.bottom
    }

    pub fn used_words(&self) -> usize {
        self.top() - self.bottom
    }

    pub fn free_words(&self) -> usize {
        self.end - self.top()
    }

    pub fn contains(&self, word: usize) -> bool {
        word >= self.bottom && word < self.end
    }

    pub fn numa_node(&self) -> usize {
        self.numa_node
    }

    pub fn region_type(&self) -> RegionType {
        RegionType::from_u8(self.region_type.load(Ordering::Acquire))
    }

    pub fn set_region_type(&self, region_type: RegionType) {
        self.region_type.store(region_type as u8, Ordering::Release);
    }

    pub fn is_young(&self) -> bool {
        self.region_type().is_young()
    }

    pub fn is_old(&self) -> bool {
        self.region_type() == RegionType::Old
    }

    pub fn is_free(&self) -> bool {
        self.region_type() == RegionType::Free
    }

    #[inline]
    pub fn attr(&self) -> RegionAttr {
        RegionAttr::from_u8(self.attr.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn young_index(&self) -> usize {
        self.young_index.load(Ordering::Relaxed)
    }

    /// Add the region to the collection set
    pub fn set_in_cset(&self, attr: RegionAttr, young_index: usize) {
        debug_assert!(attr.is_in_cset());
        debug_assert_eq!(attr.is_young(), young_index > 0);
        self.young_index.store(young_index, Ordering::Relaxed);
        self.attr.store(attr as u8, Ordering::Release);
    }

    pub fn clear_cset(&self) {
        self.attr.store(RegionAttr::NotInCset as u8, Ordering::Release);
        self.young_index.store(0, Ordering::Relaxed);
    }

    pub fn evacuation_failed(&self) -> bool {
        self.evacuation_failed.load(Ordering::Acquire)
    }

    /// Flag the region; true when this call was the first to do so
    pub fn set_evacuation_failed(&self) -> bool {
        !self.evacuation_failed.swap(true, Ordering::AcqRel)
    }

    pub fn clear_evacuation_failed(&self) {
        self.evacuation_failed.store(false, Ordering::Release);
    }

    /// Bump-allocate between `min_words` and `desired_words`
    ///
    /// Returns the start word and the number of words handed out.
    pub fn par_allocate(&self, min_words: usize, desired_words: usize) -> Option<(usize, usize)> {
        debug_assert!(min_words <= desired_words);
        let mut top = self.top.load(Ordering::Relaxed);
        loop {
            let available = self.end - top;
            if available < min_words {
                return None;
            }
            let words = desired_words.min(available);
            match self.top.compare_exchange_weak(
                top,
                top + words,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some((top, words)),
                Err(current) => top = current,
            }
        }
    }

    pub fn allocate(&self, words: usize) -> Option<usize> {
        self.par_allocate(words, words).map(|(start, _)| start)
    }

    /// Return the region to the free state
    pub fn reset(&self) {
        self.top.store(self.bottom, Ordering::Relaxed);
        self.clear_cset();
        self.clear_evacuation_failed();
        self.set_region_type(RegionType::Free);
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("index", &self.index)
            .field("type", &self.region_type())
            .field("attr", &self.attr())
            .field("used_words", &self.used_words())
            .field("node", &self.numa_node)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_par_allocate_respects_min_and_desired() {
        let region = Region::new(0, 100, 64, 0);
        assert_eq!(region.par_allocate(8, 32), Some((100, 32)));
        assert_eq!(region.par_allocate(8, 40), Some((132, 32)));
        assert_eq!(region.par_allocate(1, 1), None);
        assert_eq!(region.free_words(), 0);
    }

    #[test]
    fn test_cset_attribute() {
        let region = Region::new(3, 0, 16, 1);
        assert_eq!(region.attr(), RegionAttr::NotInCset);
        region.set_in_cset(RegionAttr::Young, 2);
        assert!(region.attr().is_young());
        assert_eq!(region.young_index(), 2);
        region.clear_cset();
        assert_eq!(region.young_index(), 0);
    }

    #[test]
    fn test_evacuation_failed_reported_once() {
        let region = Region::new(0, 0, 16, 0);
        assert!(region.set_evacuation_failed());
        assert!(!region.set_evacuation_failed());
        region.reset();
        assert!(!region.evacuation_failed());
        assert!(region.is_free());
    }
}
