//! Phase Times - Per-Worker Timing and Work Items of One Pause
//!
//! Every parallel phase gets one slot per worker. Workers that never
//! took part in a phase leave their slot empty, so summaries only cover
//! the workers that did. Work items (bytes copied, PLAB waste, steals...)
//! follow the same layout and accumulate when recorded more than once.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GcPhase {
    /// Evacuating the external roots
    ExtRootScan,
    /// Evacuating the remembered-set slots
    ScanRememberedSet,
    /// Draining queues and stealing
    ObjCopy,
    /// Time spent offering termination
    Termination,
    /// Flushing per-worker evacuation state
    MergePerThreadState,
}

impl GcPhase {
    pub const COUNT: usize = 5;
    pub const ALL: [GcPhase; Self::COUNT] = [
        GcPhase::ExtRootScan,
        GcPhase::ScanRememberedSet,
        GcPhase::ObjCopy,
        GcPhase::Termination,
        GcPhase::MergePerThreadState,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            GcPhase::ExtRootScan => "Ext Root Scanning",
            GcPhase::ScanRememberedSet => "Scan Remembered Set",
            GcPhase::ObjCopy => "Object Copy",
            GcPhase::Termination => "Termination",
            GcPhase::MergePerThreadState => "Merge Per-Thread State",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkItem {
    RootsScanned,
    RemSetSlotsScanned,
    CopiedBytes,
    LabWasteBytes,
    LabUndoWasteBytes,
    Steals,
    TerminationAttempts,
}

impl WorkItem {
    pub const COUNT: usize = 7;
    pub const ALL: [WorkItem; Self::COUNT] = [
        WorkItem::RootsScanned,
        WorkItem::RemSetSlotsScanned,
        WorkItem::CopiedBytes,
        WorkItem::LabWasteBytes,
        WorkItem::LabUndoWasteBytes,
        WorkItem::Steals,
        WorkItem::TerminationAttempts,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            WorkItem::RootsScanned => "Roots",
            WorkItem::RemSetSlotsScanned => "Remembered Slots",
            WorkItem::CopiedBytes => "Copied Bytes",
            WorkItem::LabWasteBytes => "LAB Waste",
            WorkItem::LabUndoWasteBytes => "LAB Undo Waste",
            WorkItem::Steals => "Steals",
            WorkItem::TerminationAttempts => "Termination Attempts",
        }
    }
}

/// Min / avg / max / sum over the workers that recorded a value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkerSummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub sum: f64,
    pub workers: usize,
}

impl WorkerSummary {
    fn of<I: Iterator<Item = f64>>(values: I) -> Option<Self> {
        let mut summary: Option<WorkerSummary> = None;
        for value in values {
            summary = Some(match summary {
                None => WorkerSummary {
                    min: value,
                    avg: value,
                    max: value,
                    sum: value,
                    workers: 1,
                },
                Some(s) => WorkerSummary {
                    min: s.min.min(value),
                    max: s.max.max(value),
                    sum: s.sum + value,
                    workers: s.workers + 1,
                    avg: 0.0,
                },
            });
        }
        summary.map(|s| WorkerSummary {
            avg: s.sum / s.workers as f64,
            ..s
        })
    }
}

#[derive(Debug, Clone)]
pub struct PhaseTimes {
    workers: usize,
    times_ms: Vec<Vec<Option<f64>>>,
    work_items: Vec<Vec<Option<usize>>>,
}

impl PhaseTimes {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            times_ms: vec![vec![None; workers]; GcPhase::COUNT],
            work_items: vec![vec![None; workers]; WorkItem::COUNT],
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn record_time_ms(&mut self, phase: GcPhase, worker: usize, ms: f64) {
        self.times_ms[phase.index()][worker] = Some(ms);
    }

    pub fn record_or_add_time_ms(&mut self, phase: GcPhase, worker: usize, ms: f64) {
        let slot = &mut self.times_ms[phase.index()][worker];
        *slot = Some(slot.unwrap_or(0.0) + ms);
    }

    pub fn time_ms(&self, phase: GcPhase, worker: usize) -> Option<f64> {
        self.times_ms[phase.index()][worker]
    }

    /// Record `value` for `worker`, adding to an earlier value if present
    pub fn record_or_add_work_item(&mut self, item: WorkItem, worker: usize, value: usize) {
        let slot = &mut self.work_items[item.index()][worker];
        *slot = Some(slot.unwrap_or(0) + value);
    }

    pub fn work_item(&self, item: WorkItem, worker: usize) -> Option<usize> {
        self.work_items[item.index()][worker]
    }

    pub fn time_summary(&self, phase: GcPhase) -> Option<WorkerSummary> {
        WorkerSummary::of(self.times_ms[phase.index()].iter().flatten().copied())
    }

    pub fn work_item_summary(&self, item: WorkItem) -> Option<WorkerSummary> {
        WorkerSummary::of(
            self.work_items[item.index()]
                .iter()
                .flatten()
                .map(|&v| v as f64),
        )
    }

    /// Sum of a work item over all workers
    pub fn work_item_sum(&self, item: WorkItem) -> usize {
        self.work_items[item.index()].iter().flatten().sum()
    }

    pub fn reset(&mut self) {
        for row in &mut self.times_ms {
            row.fill(None);
        }
        for row in &mut self.work_items {
            row.fill(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_skips_idle_workers() {
        let mut times = PhaseTimes::new(4);
        times.record_time_ms(GcPhase::ObjCopy, 0, 2.0);
        times.record_time_ms(GcPhase::ObjCopy, 2, 6.0);
        let summary = times.time_summary(GcPhase::ObjCopy).unwrap();
        assert_eq!(summary.workers, 2);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 6.0);
        assert_eq!(summary.avg, 4.0);
        assert_eq!(summary.sum, 8.0);
        assert!(times.time_summary(GcPhase::Termination).is_none());
    }

    #[test]
    fn test_work_items_accumulate() {
        let mut times = PhaseTimes::new(2);
        times.record_or_add_work_item(WorkItem::CopiedBytes, 1, 100);
        times.record_or_add_work_item(WorkItem::CopiedBytes, 1, 28);
        assert_eq!(times.work_item(WorkItem::CopiedBytes, 1), Some(128));
        assert_eq!(times.work_item(WorkItem::CopiedBytes, 0), None);
        assert_eq!(times.work_item_sum(WorkItem::CopiedBytes), 128);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut times = PhaseTimes::new(1);
        times.record_or_add_time_ms(GcPhase::Termination, 0, 1.0);
        times.record_or_add_work_item(WorkItem::Steals, 0, 3);
        times.reset();
        assert!(times.time_summary(GcPhase::Termination).is_none());
        assert!(times.work_item_summary(WorkItem::Steals).is_none());
    }
}
