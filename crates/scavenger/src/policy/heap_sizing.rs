//! Heap Sizing - Expansion After a Pause
//!
//! The controller compares the pause-time ratio with a target of
//! `1 / (1 + gc_time_ratio)` and decides how many bytes to add to the
//! committed heap.
//!
//! ```text
//!  short-term ratio > threshold ──▶ count += 1, sum += ratio
//!                                        │
//!   count == min_over_threshold ─────────┤
//!   window full && long-term > threshold ┴──▶ expand, clear window
//!                                        │
//!   otherwise ──▶ pauses_since_start += 1, clear once past the window
//! ```
//!
//! A small heap lowers the threshold (down to 1%) so it grows more eagerly.

use super::analytics::PauseTimeAnalytics;
use crate::config::GcConfig;

const MIN_SCALE_DOWN_FACTOR: f64 = 0.2;
const MAX_SCALE_UP_FACTOR: f64 = 2.0;
const MIN_THRESHOLD: f64 = 0.01;

/// Committed and reserved heap size at the end of a pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapCapacity {
    pub committed_bytes: usize,
    pub max_bytes: usize,
}

impl HeapCapacity {
    pub fn uncommitted_bytes(&self) -> usize {
        self.max_bytes.saturating_sub(self.committed_bytes)
    }
}

#[derive(Debug, Clone)]
pub struct HeapSizingController {
    gc_time_ratio: u32,
    initial_heap_bytes: usize,
    min_expand_bytes: usize,
    expand_by_percent_of_available: usize,
    min_over_threshold_for_growth: usize,
    num_prev_pauses_for_heuristics: usize,

    ratio_over_threshold_count: usize,
    ratio_over_threshold_sum: f64,
    pauses_since_start: usize,
}

impl HeapSizingController {
    pub fn new(config: &GcConfig) -> Self {
        Self {
            gc_time_ratio: config.gc_time_ratio,
            initial_heap_bytes: config.initial_heap_size,
            min_expand_bytes: config.region_size,
            expand_by_percent_of_available: config.expand_by_percent_of_available,
            min_over_threshold_for_growth: config.min_over_threshold_for_growth,
            num_prev_pauses_for_heuristics: config.num_prev_pauses_for_heuristics,
            ratio_over_threshold_count: 0,
            ratio_over_threshold_sum: 0.0,
            pauses_since_start: 0,
        }
    }

    pub fn ratio_over_threshold_count(&self) -> usize {
        self.ratio_over_threshold_count
    }

    pub fn ratio_over_threshold_sum(&self) -> f64 {
        self.ratio_over_threshold_sum
    }

    pub fn pauses_since_start(&self) -> usize {
        self.pauses_since_start
    }

    /// Target fraction of time spent in pauses
    pub fn pause_time_threshold(&self) -> f64 {
        1.0 / (1.0 + self.gc_time_ratio as f64)
    }

    /// Lower the threshold for heaps at most half their maximum size
    pub fn scale_with_heap(&self, threshold: f64, capacity: HeapCapacity) -> f64 {
        let half_max = capacity.max_bytes / 2;
        if half_max > 0 && capacity.committed_bytes <= half_max {
            (threshold * capacity.committed_bytes as f64 / half_max as f64).max(MIN_THRESHOLD)
        } else {
            threshold
        }
    }

    fn clear_ratio_check_data(&mut self) {
        self.ratio_over_threshold_count = 0;
        self.ratio_over_threshold_sum = 0.0;
        self.pauses_since_start = 0;
    }

    /// Bytes to expand the heap by after a pause; 0 for no expansion
    pub fn expansion_amount(
        &mut self,
        analytics: &dyn PauseTimeAnalytics,
        capacity: HeapCapacity,
    ) -> usize {
        let long_term_ratio = analytics.long_term_pause_time_ratio();
        let short_term_ratio = analytics.short_term_pause_time_ratio();
        let pause_time_threshold = self.pause_time_threshold();
        let threshold = self.scale_with_heap(pause_time_threshold, capacity);

        if capacity.committed_bytes >= capacity.max_bytes {
            log::debug!(
                "Heap sizing: capacity {} at maximum, short-term ratio {:.4}, threshold {:.4}",
                capacity.committed_bytes,
                short_term_ratio,
                threshold
            );
            self.clear_ratio_check_data();
            return 0;
        }

        if short_term_ratio > threshold {
            self.ratio_over_threshold_count += 1;
            self.ratio_over_threshold_sum += short_term_ratio;
        }

        log::trace!(
            "Heap sizing: short-term {:.4}, long-term {:.4}, threshold {:.4}, over {} of {} pauses",
            short_term_ratio,
            long_term_ratio,
            threshold,
            self.ratio_over_threshold_count,
            self.pauses_since_start
        );

        let filled_history = self.pauses_since_start >= self.num_prev_pauses_for_heuristics;
        let triggered = self.ratio_over_threshold_count >= self.min_over_threshold_for_growth
            || (filled_history && long_term_ratio > threshold);

        if !triggered {
            self.pauses_since_start += 1;
            if self.pauses_since_start > self.num_prev_pauses_for_heuristics {
                self.clear_ratio_check_data();
            }
            return 0;
        }

        let uncommitted = capacity.uncommitted_bytes();
        let mut scale_factor = 1.0;
        let base = if capacity.committed_bytes < self.initial_heap_bytes / 4 {
            // Grow back toward the initial size quickly
            (self.initial_heap_bytes - capacity.committed_bytes) / 2
        } else {
            let start_scale_down_at = pause_time_threshold;
            let start_scale_up_at = pause_time_threshold * 1.5;
            let scale_up_range = pause_time_threshold * 2.0;

            let ratio_delta = if filled_history {
                long_term_ratio - threshold
            } else {
                self.ratio_over_threshold_sum / self.ratio_over_threshold_count as f64 - threshold
            };

            if ratio_delta < start_scale_down_at {
                scale_factor = (ratio_delta / start_scale_down_at).max(MIN_SCALE_DOWN_FACTOR);
            } else if ratio_delta > start_scale_up_at {
                scale_factor = (1.0 + (ratio_delta - start_scale_up_at) / scale_up_range)
                    .min(MAX_SCALE_UP_FACTOR);
            }

            let via_pct = uncommitted * self.expand_by_percent_of_available / 100;
            via_pct.min(capacity.committed_bytes)
        };

        let expand_bytes = ((base as f64 * scale_factor) as usize)
            .max(self.min_expand_bytes)
            .min(uncommitted);

        log::debug!(
            "Heap sizing: expand by {} bytes (base {}, scale {:.2}, uncommitted {})",
            expand_bytes,
            base,
            scale_factor,
            uncommitted
        );

        self.clear_ratio_check_data();
        expand_bytes
    }
}
