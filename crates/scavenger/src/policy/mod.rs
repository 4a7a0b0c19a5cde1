//! Policy Module - Decisions Taken Between Pauses
//!
//! - [`TenuringPolicy`]: age at which survivors are promoted
//! - [`PauseAnalytics`]: pause-time ratios over recent pauses
//! - [`HeapSizingController`]: how much to grow the heap

pub mod age_table;
pub mod analytics;
pub mod heap_sizing;

pub use age_table::{AgeTable, TenuringPolicy};
pub use analytics::{PauseAnalytics, PauseTimeAnalytics, TruncatedSeq};
pub use heap_sizing::{HeapCapacity, HeapSizingController};
