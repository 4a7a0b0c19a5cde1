//! Pause Analytics - Pause-Time Ratios
//!
//! Keeps the last few pause durations and end times. The *short-term*
//! ratio is the last pause over the time since the previous pause ended;
//! the *long-term* ratio is the recent pauses over the time since the
//! oldest remembered pause ended.

use std::collections::VecDeque;

/// Pause-time history consumed by heap sizing
pub trait PauseTimeAnalytics {
    fn short_term_pause_time_ratio(&self) -> f64;
    fn long_term_pause_time_ratio(&self) -> f64;
    fn number_of_recorded_pause_times(&self) -> usize;
}

/// Fixed-length sequence keeping the most recent values
#[derive(Debug, Clone)]
pub struct TruncatedSeq {
    values: VecDeque<f64>,
    length: usize,
}

impl TruncatedSeq {
    pub fn new(length: usize) -> Self {
        assert!(length > 0, "truncated sequence needs room for one value");
        Self {
            values: VecDeque::with_capacity(length),
            length,
        }
    }

    pub fn add(&mut self, value: f64) {
        if self.values.len() == self.length {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn num(&self) -> usize {
        self.values.len()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn oldest(&self) -> Option<f64> {
        self.values.front().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }
}

#[derive(Debug, Clone)]
pub struct PauseAnalytics {
    recent_gc_times_ms: TruncatedSeq,
    /// End times in seconds since the collector started; seeded with 0.0
    recent_end_times_sec: TruncatedSeq,
    short_term_ratio: f64,
    long_term_ratio: f64,
}

impl PauseAnalytics {
    pub fn new(num_prev_pauses: usize) -> Self {
        let mut recent_end_times_sec = TruncatedSeq::new(num_prev_pauses);
        recent_end_times_sec.add(0.0);
        Self {
            recent_gc_times_ms: TruncatedSeq::new(num_prev_pauses),
            recent_end_times_sec,
            short_term_ratio: 0.0,
            long_term_ratio: 0.0,
        }
    }

    /// Account for a pause of `pause_ms` ending at `end_time_sec`
    pub fn record_pause(&mut self, end_time_sec: f64, pause_ms: f64) {
        self.compute_pause_time_ratios(end_time_sec, pause_ms);
        self.recent_gc_times_ms.add(pause_ms);
        self.recent_end_times_sec.add(end_time_sec);
    }

    fn compute_pause_time_ratios(&mut self, end_time_sec: f64, pause_ms: f64) {
        let oldest = self.recent_end_times_sec.oldest().unwrap_or(0.0);
        let long_interval_ms = (end_time_sec - oldest) * 1000.0;
        self.long_term_ratio = Self::ratio(
            self.recent_gc_times_ms.sum() + pause_ms,
            long_interval_ms,
        );

        let most_recent = self.recent_end_times_sec.last().unwrap_or(0.0);
        let short_interval_ms = (end_time_sec - most_recent) * 1000.0;
        self.short_term_ratio = Self::ratio(pause_ms, short_interval_ms);
    }

    fn ratio(pause_ms: f64, interval_ms: f64) -> f64 {
        if interval_ms <= 0.0 {
            return if pause_ms > 0.0 { 1.0 } else { 0.0 };
        }
        (pause_ms / interval_ms).clamp(0.0, 1.0)
    }
}

impl PauseTimeAnalytics for PauseAnalytics {
    fn short_term_pause_time_ratio(&self) -> f64 {
        self.short_term_ratio
    }

    fn long_term_pause_time_ratio(&self) -> f64 {
        self.long_term_ratio
    }

    fn number_of_recorded_pause_times(&self) -> usize {
        self.recent_gc_times_ms.num()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_seq_drops_oldest() {
        let mut seq = TruncatedSeq::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            seq.add(v);
        }
        assert_eq!(seq.num(), 3);
        assert_eq!(seq.oldest(), Some(2.0));
        assert_eq!(seq.last(), Some(4.0));
        assert_eq!(seq.sum(), 9.0);
    }

    #[test]
    fn test_short_term_ratio() {
        let mut analytics = PauseAnalytics::new(10);
        // 100ms pause ending 1s after start
        analytics.record_pause(1.0, 100.0);
        assert!((analytics.short_term_pause_time_ratio() - 0.1).abs() < 1e-9);
        // 50ms pause ending 0.5s after the previous one
        analytics.record_pause(1.5, 50.0);
        assert!((analytics.short_term_pause_time_ratio() - 0.1).abs() < 1e-9);
        assert_eq!(analytics.number_of_recorded_pause_times(), 2);
    }

    #[test]
    fn test_long_term_ratio_covers_history() {
        let mut analytics = PauseAnalytics::new(10);
        analytics.record_pause(1.0, 100.0);
        analytics.record_pause(2.0, 300.0);
        // (100 + 300) / 2000
        assert!((analytics.long_term_pause_time_ratio() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_ratios_are_clamped() {
        let mut analytics = PauseAnalytics::new(4);
        analytics.record_pause(0.001, 500.0);
        assert_eq!(analytics.short_term_pause_time_ratio(), 1.0);
        assert_eq!(analytics.long_term_pause_time_ratio(), 1.0);
    }
}
