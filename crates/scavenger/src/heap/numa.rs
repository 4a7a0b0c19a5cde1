//! NUMA (Non-Uniform Memory Access) Awareness
//!
//! Regions are striped across a configured number of nodes:
//!
//! ```text
//! region:  0   1   2   3   4   5 ...
//! node:    0   1   0   1   0   1 ...      (numa_nodes = 2)
//! ```
//!
//! Evacuation copies an object into a PLAB on the node its source region
//! lives on, so objects stay node-local across pauses. Per-worker copy
//! counters are flushed into [`NumaStats`] at the end of a pause.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Region-to-node mapping
#[derive(Debug, Clone, Copy)]
pub struct NumaTopology {
    node_count: usize,
}

impl NumaTopology {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count: node_count.max(1),
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn is_enabled(&self) -> bool {
        self.node_count > 1
    }

    #[inline]
    pub fn node_of_region(&self, region_index: usize) -> usize {
        region_index % self.node_count
    }
}

/// Objects copied per node during a pause
#[derive(Debug)]
pub struct NumaStats {
    copies: Box<[AtomicUsize]>,
}

impl NumaStats {
    pub fn new(node_count: usize) -> Self {
        Self {
            copies: (0..node_count.max(1)).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    /// Add a worker's per-node object copy counts
    pub fn add_object_copies(&self, per_node: &[usize]) {
        for (slot, &count) in self.copies.iter().zip(per_node) {
            if count > 0 {
                slot.fetch_add(count, Ordering::Relaxed);
            }
        }
    }

    pub fn copies_on_node(&self, node: usize) -> usize {
        self.copies
            .get(node)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn total_copies(&self) -> usize {
        self.copies.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_are_striped() {
        let topo = NumaTopology::new(2);
        assert!(topo.is_enabled());
        assert_eq!(topo.node_of_region(0), 0);
        assert_eq!(topo.node_of_region(3), 1);
        assert!(!NumaTopology::new(0).is_enabled());
    }

    #[test]
    fn test_stats_accumulate() {
        let stats = NumaStats::new(2);
        stats.add_object_copies(&[3, 1]);
        stats.add_object_copies(&[2, 0]);
        assert_eq!(stats.copies_on_node(0), 5);
        assert_eq!(stats.copies_on_node(1), 1);
        assert_eq!(stats.total_copies(), 6);
    }
}
