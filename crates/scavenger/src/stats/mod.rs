//! Stats Module - Collector Performance Monitoring
//!
//! Collects statistics across pauses for tuning and debugging:
//! - Pause time distribution
//! - Bytes copied to survivor regions and promoted to old regions
//! - Evacuation failures
//! - Heap expansions
//!
//! Per-pause, per-worker detail lives in [`PhaseTimes`].

pub mod histogram;
pub mod phase_times;
pub mod timer;

pub use histogram::Histogram;
pub use phase_times::{GcPhase, PhaseTimes, WorkItem, WorkerSummary};
pub use timer::PhaseTimer;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Totals over the collector's lifetime
pub struct GcStats {
    collections: AtomicU64,
    /// Pause durations in microseconds
    pause_stats: Histogram,
    survived_bytes: AtomicU64,
    promoted_bytes: AtomicU64,
    failed_collections: AtomicU64,
    failed_objects: AtomicU64,
    expansions: AtomicU64,
    expanded_bytes: AtomicU64,
    start_time: Instant,
}

impl GcStats {
    pub fn new() -> Self {
        Self {
            collections: AtomicU64::new(0),
            pause_stats: Histogram::new(),
            survived_bytes: AtomicU64::new(0),
            promoted_bytes: AtomicU64::new(0),
            failed_collections: AtomicU64::new(0),
            failed_objects: AtomicU64::new(0),
            expansions: AtomicU64::new(0),
            expanded_bytes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one completed pause
    pub fn record_collection(
        &self,
        duration: Duration,
        survived_bytes: usize,
        promoted_bytes: usize,
        failed_objects: usize,
    ) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.pause_stats.record(duration.as_micros() as u64);
        self.survived_bytes
            .fetch_add(survived_bytes as u64, Ordering::Relaxed);
        self.promoted_bytes
            .fetch_add(promoted_bytes as u64, Ordering::Relaxed);
        if failed_objects > 0 {
            self.failed_collections.fetch_add(1, Ordering::Relaxed);
            self.failed_objects
                .fetch_add(failed_objects as u64, Ordering::Relaxed);
        }
    }

    pub fn record_expansion(&self, bytes: usize) {
        if bytes > 0 {
            self.expansions.fetch_add(1, Ordering::Relaxed);
            self.expanded_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub fn collections(&self) -> u64 {
        self.collections.load(Ordering::Relaxed)
    }

    pub fn pause_histogram(&self) -> &Histogram {
        &self.pause_stats
    }

    pub fn summary(&self) -> GcSummary {
        GcSummary {
            collections: self.collections(),
            avg_pause_ms: self.pause_stats.mean() as f64 / 1000.0,
            max_pause_ms: self.pause_stats.max() as f64 / 1000.0,
            p99_pause_ms: self.pause_stats.p99() as f64 / 1000.0,
            total_pause_ms: self.pause_stats.sum() as f64 / 1000.0,
            survived_bytes: self.survived_bytes.load(Ordering::Relaxed),
            promoted_bytes: self.promoted_bytes.load(Ordering::Relaxed),
            failed_collections: self.failed_collections.load(Ordering::Relaxed),
            failed_objects: self.failed_objects.load(Ordering::Relaxed),
            expansions: self.expansions.load(Ordering::Relaxed),
            expanded_bytes: self.expanded_bytes.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn reset(&self) {
        self.collections.store(0, Ordering::Relaxed);
        self.pause_stats.clear();
        self.survived_bytes.store(0, Ordering::Relaxed);
        self.promoted_bytes.store(0, Ordering::Relaxed);
        self.failed_collections.store(0, Ordering::Relaxed);
        self.failed_objects.store(0, Ordering::Relaxed);
        self.expansions.store(0, Ordering::Relaxed);
        self.expanded_bytes.store(0, Ordering::Relaxed);
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GcStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcStats")
            .field("summary", &self.summary())
            .finish()
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GcSummary {
    pub collections: u64,
    pub avg_pause_ms: f64,
    pub max_pause_ms: f64,
    pub p99_pause_ms: f64,
    pub total_pause_ms: f64,
    pub survived_bytes: u64,
    pub promoted_bytes: u64,
    /// Pauses with at least one evacuation failure
    pub failed_collections: u64,
    pub failed_objects: u64,
    pub expansions: u64,
    pub expanded_bytes: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_collection() {
        let stats = GcStats::new();
        stats.record_collection(Duration::from_micros(1500), 800, 200, 0);
        stats.record_collection(Duration::from_micros(500), 100, 0, 3);
        let summary = stats.summary();
        assert_eq!(summary.collections, 2);
        assert_eq!(summary.survived_bytes, 900);
        assert_eq!(summary.promoted_bytes, 200);
        assert_eq!(summary.failed_collections, 1);
        assert_eq!(summary.failed_objects, 3);
        assert_eq!(summary.max_pause_ms, 1.5);
        assert_eq!(summary.total_pause_ms, 2.0);
    }

    #[test]
    fn test_zero_expansion_is_not_counted() {
        let stats = GcStats::new();
        stats.record_expansion(0);
        stats.record_expansion(4096);
        assert_eq!(stats.summary().expansions, 1);
        assert_eq!(stats.summary().expanded_bytes, 4096);
    }

    #[test]
    fn test_reset() {
        let stats = GcStats::new();
        stats.record_collection(Duration::from_micros(10), 1, 1, 1);
        stats.reset();
        assert_eq!(stats.summary().collections, 0);
        assert_eq!(stats.pause_histogram().count(), 0);
    }
}
