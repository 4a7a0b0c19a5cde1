//! Collection Set - Regions Evacuated by One Pause
//!
//! A young pause collects every eden and survivor region. Young regions
//! get dense indices `1..=k` into the per-worker surviving-words arrays;
//! index 0 collects everything copied out of old regions.

use crate::heap::{Heap, RegionAttr, RegionType};

#[derive(Debug, Clone, Default)]
pub struct CollectionSet {
    regions: Vec<usize>,
    young_length: usize,
    eden_regions: usize,
    survivor_regions: usize,
}

impl CollectionSet {
    /// Select all committed young regions and tag them in the heap
    pub fn young_from(heap: &Heap) -> Self {
        let mut cset = Self::default();
        for region in heap.committed() {
            match region.region_type() {
                RegionType::Eden => cset.eden_regions += 1,
                RegionType::Survivor => cset.survivor_regions += 1,
                _ => continue,
            }
            cset.young_length += 1;
            region.set_in_cset(RegionAttr::Young, cset.young_length);
            cset.regions.push(region.index());
        }
        log::debug!(
            "Collection set: {} eden, {} survivor regions",
            cset.eden_regions,
            cset.survivor_regions
        );
        cset
    }

    /// Add an old region; objects in it are always promoted
    pub fn add_old_region(&mut self, heap: &Heap, index: usize) {
        let region = heap.region(index);
        debug_assert!(region.is_old(), "region {} is not old", index);
        if region.attr().is_in_cset() {
            return;
        }
        region.set_in_cset(RegionAttr::Old, 0);
        self.regions.push(index);
    }

    pub fn regions(&self) -> &[usize] {
        &self.regions
    }

    /// Number of young regions; surviving-words arrays have one more slot
    pub fn young_region_length(&self) -> usize {
        self.young_length
    }

    pub fn eden_regions(&self) -> usize {
        self.eden_regions
    }

    pub fn survivor_regions(&self) -> usize {
        self.survivor_regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Drop the collection-set tags from the heap
    pub fn clear(&self, heap: &Heap) {
        for &index in &self.regions {
            heap.region(index).clear_cset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::util::constants::KB;

    fn heap() -> Heap {
        Heap::new(&GcConfig {
            initial_heap_size: 128 * KB,
            max_heap_size: 128 * KB,
            region_size: 16 * KB,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_young_regions_get_dense_indices() {
        let heap = heap();
        // Two eden regions
        heap.new_type_array(heap.region_words() - 3).unwrap();
        heap.new_type_array(8).unwrap();
        heap.new_old_instance(1, 0).unwrap();

        let cset = CollectionSet::young_from(&heap);
        assert_eq!(cset.young_region_length(), 2);
        assert_eq!(cset.eden_regions(), 2);
        let indices: Vec<_> = cset
            .regions()
            .iter()
            .map(|&i| heap.region(i).young_index())
            .collect();
        assert_eq!(indices, vec![1, 2]);
        for &i in cset.regions() {
            assert_eq!(heap.region(i).attr(), RegionAttr::Young);
        }
    }

    #[test]
    fn test_old_region_and_clear() {
        let heap = heap();
        let old = heap.new_old_instance(1, 0).unwrap();
        let old_index = heap.region_containing(old.index()).index();
        let mut cset = CollectionSet::young_from(&heap);
        assert!(cset.is_empty());
        cset.add_old_region(&heap, old_index);
        cset.add_old_region(&heap, old_index);
        assert_eq!(cset.len(), 1);
        assert_eq!(heap.region(old_index).attr(), RegionAttr::Old);
        cset.clear(&heap);
        assert_eq!(heap.region(old_index).attr(), RegionAttr::NotInCset);
    }
}
