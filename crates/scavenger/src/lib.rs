//! # Scavenger - Parallel Young-Generation Evacuation
//!
//! Scavenger is a stop-the-world copying collector for the young generation
//! of a region-based heap. A pause copies every live object out of the eden
//! and survivor regions on several worker threads at once, ages survivors,
//! promotes old-enough objects, and grows the heap when pauses take too
//! large a share of wall-clock time.
//!
//! ## Overview
//!
//! - **Work-Stealing Queues**: bounded lock-free deques with an unbounded
//!   overflow stack per worker, stolen from with best-of-two selection
//! - **PLAB Allocation**: each worker copies into private promotion-local
//!   allocation buffers per destination and NUMA node
//! - **Atomic Forwarding**: one header CAS decides which worker owns the copy;
//!   losers undo their allocation
//! - **Evacuation Failure**: objects that cannot be copied are forwarded to
//!   themselves and their regions kept as old regions
//! - **Adaptive Policies**: tenuring threshold from an age table, PLAB size from
//!   waste statistics, heap size from pause-time ratios
//!
//! ## Quick Start
//!
//! ```rust
//! use scavenger::{GarbageCollector, GcConfig, RootSet};
//!
//! fn main() -> Result<(), scavenger::ScavengeError> {
//!     let mut gc = GarbageCollector::new(GcConfig {
//!         gc_threads: Some(2),
//!         ..Default::default()
//!     })?;
//!     let mut roots = RootSet::new();
//!
//!     let parent = gc.heap().new_instance(1, 0)?;
//!     let child = gc.heap().new_instance(0, 2)?;
//!     gc.heap().store_ref(parent, 0, Some(child))?;
//!     let handle = roots.add(Some(parent));
//!
//!     let summary = gc.collect(&roots)?;
//!     assert_eq!(summary.totals.survivor_objects, 2);
//!
//!     // Roots are updated in place
//!     let parent = roots.get(handle).unwrap();
//!     assert!(gc.heap().load_ref(parent, 0)?.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    GarbageCollector                          │
//! │   TenuringPolicy   PLAB sizes   PauseAnalytics   HeapSizing  │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ collect(roots)
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ EvacuationContext: CollectionSet, EvacAllocator, queues      │
//! │                                                              │
//! │  worker 0 ◀──steal──▶ worker 1 ◀──steal──▶ ... worker n-1    │
//! │   roots / remembered slots ─▶ copy ─▶ scan fields ─▶ push    │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ flush, post_evacuate
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Heap: eden freed, survivors aged, promoted objects in old,   │
//! │       remembered set rebuilt, failed regions kept as old     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Object Layout
//!
//! ```text
//! word 0: mark   (age, identity hash, lock state or forwarding pointer)
//! word 1: klass  (kind, field counts)
//! word 2: length (arrays only)
//! then:   references (one per word, or two per word when compressed), data
//! ```
//!
//! ## Modules
//!
//! - [`allocator`]: GC alloc regions and per-worker PLABs
//! - [`config`]: Collector configuration and validation
//! - [`error`]: Error types
//! - [`evacuate`]: Copy engine, per-worker state and post-evacuation cleanup
//! - [`gc`]: Pause orchestration
//! - [`heap`]: Regions, object storage, remembered set and NUMA topology
//! - [`logging`]: Structured GC events
//! - [`object`]: Object headers, references and slots
//! - [`policy`]: Tenuring, pause-time analytics and heap sizing
//! - [`stats`]: Pause statistics and per-worker phase times
//! - [`taskqueue`]: Work-stealing queues and termination
//! - [`util`]: Constants and helpers
//!
//! ## Limitations
//!
//! - **Young Only**: old regions are never collected
//! - **No Humongous Objects**: objects must fit in a single region
//! - **Precise Roots**: every external reference must be registered in a [`RootSet`]

// Core GC modules
pub mod config;
pub mod error;
pub mod gc;

// Memory management subsystems
pub mod allocator;
pub mod heap;
pub mod object;

// Evacuation components
pub mod evacuate;
pub mod policy;
pub mod taskqueue;

// Monitoring
pub mod logging;
pub mod stats;

// Utilities
pub mod util;

// Re-export main types for convenience
pub use config::{ConfigError, GcConfig};
pub use error::{Result, ScavengeError};
pub use evacuate::{EvacuationTotals, PostEvacuationSummary};
pub use gc::{EvacuationSummary, GarbageCollector, RootSet};
pub use heap::{Destination, Heap};
pub use object::{MarkWord, ObjRef};

/// Scavenger version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
