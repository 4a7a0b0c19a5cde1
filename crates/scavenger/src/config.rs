//! Configuration Module - Collector Tuning Parameters
//!
//! Manages all configuration parameters for the young collector: heap
//! geometry, worker parallelism, PLAB sizing, tenuring, work-stealing queue
//! geometry and the heap-sizing policy.

use crate::util::bytes_to_words;
use crate::util::constants::{KB, MB, WORD_SIZE};
use thiserror::Error;

/// Main configuration for the young collector
///
/// # Examples
///
/// ```rust
/// use scavenger::GcConfig;
///
/// let config = GcConfig {
///     gc_threads: Some(2),
///     compressed_refs: false,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Committed heap size at startup in bytes
    pub initial_heap_size: usize,

    /// Reserved heap size in bytes; expansion never goes past it
    pub max_heap_size: usize,

    /// Region size in bytes (power of two)
    pub region_size: usize,

    /// Number of parallel GC worker threads
    ///
    /// `None` picks `min(4, num_cpus / 2)`, at least one.
    pub gc_threads: Option<usize>,

    /// Store reference fields as 32-bit word indices, two per word
    pub compressed_refs: bool,

    /// Tenuring threshold used by the first pause
    pub initial_tenuring_threshold: u8,

    /// Upper bound for the computed tenuring threshold (at most 15)
    pub max_tenuring_threshold: u8,

    /// Desired survivor occupancy after a pause, in percent
    pub target_survivor_ratio: u32,

    /// Maximum number of survivor regions per pause
    ///
    /// `None` uses one eighth of the reserved regions.
    pub max_survivor_regions: Option<usize>,

    /// Initial PLAB size for survivor destinations, in words
    pub young_plab_size: usize,

    /// Initial PLAB size for old destinations, in words
    pub old_plab_size: usize,

    /// Lower bound for adaptive PLAB sizing, in words
    pub min_plab_size: usize,

    /// Allowed PLAB waste at refill, in percent of the PLAB size
    pub plab_buffer_waste_pct: usize,

    /// Object-array elements scanned per partial-array task
    pub partial_array_chunk: usize,

    /// Target local queue size kept when draining before stealing
    pub drain_stack_target: usize,

    /// Capacity of each bounded work-stealing queue (power of two)
    pub task_queue_capacity: usize,

    /// Desired ratio of mutator time to GC time
    pub gc_time_ratio: u32,

    /// Share of uncommitted space used as the expansion baseline, in percent
    pub expand_by_percent_of_available: usize,

    /// Number of over-threshold pauses that triggers an expansion
    pub min_over_threshold_for_growth: usize,

    /// Length of the pause history window used by heap sizing
    pub num_prev_pauses_for_heuristics: usize,

    /// Number of NUMA nodes regions are striped across
    pub numa_nodes: usize,

    /// Capacity of the monitor side table holding displaced headers
    pub monitor_slots: usize,

    /// Enable verbose GC logging
    pub verbose: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            initial_heap_size: 8 * MB,
            max_heap_size: 64 * MB,
            region_size: 256 * KB,
            gc_threads: None,
            compressed_refs: true,
            initial_tenuring_threshold: 7,
            max_tenuring_threshold: 15,
            target_survivor_ratio: 50,
            max_survivor_regions: None,
            young_plab_size: 1024,
            old_plab_size: 1024,
            min_plab_size: 64,
            plab_buffer_waste_pct: 10,
            partial_array_chunk: 50,
            drain_stack_target: 64,
            task_queue_capacity: 1 << 14,
            gc_time_ratio: 12,
            expand_by_percent_of_available: 20,
            min_over_threshold_for_growth: 4,
            num_prev_pauses_for_heuristics: 10,
            numa_nodes: 1,
            monitor_slots: 1024,
            verbose: false,
        }
    }
}

impl GcConfig {
    /// Validate configuration
    ///
    /// Checks every parameter for consistency.
    /// Returns an error if the configuration cannot back a heap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.region_size.is_power_of_two() || self.region_size < 4 * KB {
            return Err(ConfigError::InvalidRegionSize(
                "region_size must be a power of two of at least 4KB".to_string(),
            ));
        }

        if self.max_heap_size == 0 || self.max_heap_size % self.region_size != 0 {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_size must be a non-zero multiple of region_size".to_string(),
            ));
        }

        if self.initial_heap_size < self.region_size || self.initial_heap_size > self.max_heap_size
        {
            return Err(ConfigError::InvalidHeapSize(
                "initial_heap_size must be between region_size and max_heap_size".to_string(),
            ));
        }

        // Word indices are stored in 32 bits by narrow slots and partial-array tasks
        if self.max_heap_size / WORD_SIZE >= u32::MAX as usize {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_size must stay below 2^32 words".to_string(),
            ));
        }

        if self.gc_threads == Some(0) {
            return Err(ConfigError::InvalidGcThreads(
                "gc_threads must be > 0".to_string(),
            ));
        }

        if self.max_tenuring_threshold > 15
            || self.initial_tenuring_threshold > self.max_tenuring_threshold
        {
            return Err(ConfigError::InvalidThreshold(
                "tenuring thresholds must satisfy initial <= max <= 15".to_string(),
            ));
        }

        if self.target_survivor_ratio == 0 || self.target_survivor_ratio > 100 {
            return Err(ConfigError::InvalidThreshold(
                "target_survivor_ratio must be in 1..=100".to_string(),
            ));
        }

        if self.min_plab_size == 0
            || self.young_plab_size < self.min_plab_size
            || self.old_plab_size < self.min_plab_size
            || self.young_plab_size > self.region_words()
            || self.old_plab_size > self.region_words()
        {
            return Err(ConfigError::InvalidPlabSize(
                "PLAB sizes must lie between min_plab_size and the region size".to_string(),
            ));
        }

        if self.plab_buffer_waste_pct > 100 {
            return Err(ConfigError::InvalidPlabSize(
                "plab_buffer_waste_pct must be <= 100".to_string(),
            ));
        }

        if self.partial_array_chunk == 0 {
            return Err(ConfigError::InvalidThreshold(
                "partial_array_chunk must be > 0".to_string(),
            ));
        }

        if !self.task_queue_capacity.is_power_of_two()
            || self.task_queue_capacity < 4
            || self.task_queue_capacity > (1 << 30)
        {
            return Err(ConfigError::InvalidQueueCapacity(
                "task_queue_capacity must be a power of two in 4..=2^30".to_string(),
            ));
        }

        if self.stack_trim_upper_threshold() >= self.task_queue_capacity - 2 {
            return Err(ConfigError::InvalidQueueCapacity(
                "drain_stack_target too large for task_queue_capacity".to_string(),
            ));
        }

        if self.gc_time_ratio == 0 {
            return Err(ConfigError::InvalidHeapSizing(
                "gc_time_ratio must be > 0".to_string(),
            ));
        }

        if self.expand_by_percent_of_available > 100 {
            return Err(ConfigError::InvalidHeapSizing(
                "expand_by_percent_of_available must be <= 100".to_string(),
            ));
        }

        if self.min_over_threshold_for_growth == 0
            || self.min_over_threshold_for_growth >= self.num_prev_pauses_for_heuristics
        {
            return Err(ConfigError::InvalidHeapSizing(
                "min_over_threshold_for_growth must be in 1..num_prev_pauses_for_heuristics"
                    .to_string(),
            ));
        }

        if self.numa_nodes == 0 {
            return Err(ConfigError::InvalidNuma(
                "numa_nodes must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - SCAVENGER_INITIAL_HEAP: Initial heap size in bytes
    /// - SCAVENGER_MAX_HEAP: Maximum heap size in bytes
    /// - SCAVENGER_REGION_SIZE: Region size in bytes
    /// - SCAVENGER_GC_THREADS: Number of GC worker threads
    /// - SCAVENGER_COMPRESSED_REFS: 1/true to use narrow reference slots
    /// - SCAVENGER_VERBOSE: Enable verbose logging (1/true)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = env_parse::<usize>("SCAVENGER_INITIAL_HEAP") {
            config.initial_heap_size = size;
        }

        if let Some(size) = env_parse::<usize>("SCAVENGER_MAX_HEAP") {
            config.max_heap_size = size;
        }

        if let Some(size) = env_parse::<usize>("SCAVENGER_REGION_SIZE") {
            config.region_size = size;
        }

        if let Some(threads) = env_parse::<usize>("SCAVENGER_GC_THREADS") {
            config.gc_threads = Some(threads);
        }

        if let Ok(val) = std::env::var("SCAVENGER_COMPRESSED_REFS") {
            config.compressed_refs = env_flag(&val);
        }

        if let Ok(val) = std::env::var("SCAVENGER_VERBOSE") {
            config.verbose = env_flag(&val);
        }

        config
    }

    /// Number of worker threads a pause runs with
    pub fn worker_count(&self) -> usize {
        self.gc_threads
            .unwrap_or_else(|| (num_cpus::get() / 2).clamp(1, 4))
    }

    /// Region size in words
    pub fn region_words(&self) -> usize {
        bytes_to_words(self.region_size)
    }

    /// Number of reserved regions
    pub fn max_regions(&self) -> usize {
        self.max_heap_size / self.region_size
    }

    /// Number of regions committed at startup
    pub fn initial_regions(&self) -> usize {
        (self.initial_heap_size + self.region_size - 1) / self.region_size
    }

    /// Survivor region budget for a single pause
    pub fn survivor_region_limit(&self) -> usize {
        self.max_survivor_regions
            .unwrap_or_else(|| (self.max_regions() / 8).max(1))
    }

    /// Queue size above which a worker drains its queue before scanning more
    pub fn stack_trim_upper_threshold(&self) -> usize {
        self.drain_stack_target * 2 + 1
    }

    /// Queue size a partial drain stops at
    pub fn stack_trim_lower_threshold(&self) -> usize {
        self.drain_stack_target
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

fn env_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

/// Configuration validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid heap size: {0}")]
    InvalidHeapSize(String),

    #[error("Invalid region size: {0}")]
    InvalidRegionSize(String),

    #[error("Invalid PLAB size: {0}")]
    InvalidPlabSize(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid GC threads: {0}")]
    InvalidGcThreads(String),

    #[error("Invalid task queue capacity: {0}")]
    InvalidQueueCapacity(String),

    #[error("Invalid heap sizing parameter: {0}")]
    InvalidHeapSizing(String),

    #[error("Invalid NUMA configuration: {0}")]
    InvalidNuma(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GcConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_count() >= 1);
        assert_eq!(config.stack_trim_upper_threshold(), 129);
        assert_eq!(config.stack_trim_lower_threshold(), 64);
    }

    #[test]
    fn test_region_geometry() {
        let config = GcConfig {
            initial_heap_size: 3 * MB,
            max_heap_size: 8 * MB,
            region_size: MB,
            ..Default::default()
        };
        assert_eq!(config.region_words(), MB / 8);
        assert_eq!(config.max_regions(), 8);
        assert_eq!(config.initial_regions(), 3);
        assert_eq!(config.survivor_region_limit(), 1);
    }

    #[test]
    fn test_rejects_bad_region_size() {
        let config = GcConfig {
            region_size: 3000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRegionSize(_))
        ));
    }

    #[test]
    fn test_rejects_initial_above_max() {
        let config = GcConfig {
            initial_heap_size: 128 * MB,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeapSize(_))
        ));
    }

    #[test]
    fn test_rejects_zero_threads() {
        let config = GcConfig {
            gc_threads: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGcThreads(_))
        ));
    }

    #[test]
    fn test_rejects_growth_trigger_outside_window() {
        let config = GcConfig {
            min_over_threshold_for_growth: 10,
            num_prev_pauses_for_heuristics: 10,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeapSizing(_))
        ));
    }

    #[test]
    fn test_rejects_non_power_of_two_queue() {
        let config = GcConfig {
            task_queue_capacity: 1000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQueueCapacity(_))
        ));
    }
}
