//! Phase Timer - Timing Utilities
//!
//! Wall-clock timing of pauses and worker phases.

use std::time::{Duration, Instant};

/// Timer started on construction
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimer {
    start: Instant,
}

impl PhaseTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Elapsed milliseconds, restarting the timer
    pub fn lap_ms(&mut self) -> f64 {
        let now = Instant::now();
        let ms = now.duration_since(self.start).as_secs_f64() * 1000.0;
        self.start = now;
        ms
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_monotonic() {
        let timer = PhaseTimer::start();
        std::thread::sleep(Duration::from_millis(2));
        let first = timer.elapsed_ms();
        assert!(first >= 2.0);
        assert!(timer.elapsed_ms() >= first);
    }

    #[test]
    fn test_lap_restarts() {
        let mut timer = PhaseTimer::start();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.lap_ms() >= 2.0);
        assert!(timer.elapsed_ms() < 1000.0);
    }
}
