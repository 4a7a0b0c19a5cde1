//! GC Logging and Tracing
//!
//! Structured events for young pauses, useful for:
//! - Pause-time analysis
//! - Tuning tenuring and heap sizing
//! - Debugging evacuation failures
//!
//! Every event is forwarded to the `log` facade at its level and kept in
//! memory for inspection. Console output is optional.
//!
//! Log Levels:
//! - WARN: Evacuation failures
//! - INFO: Pause start and end, heap expansion
//! - DEBUG: Tenuring decisions, PLAB resizing
//! - TRACE: Per-worker statistics

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Log level for GC events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    fn as_log(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// GC event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcEvent {
    /// Young pause started
    PauseStart {
        cycle: u64,
        eden_regions: usize,
        survivor_regions: usize,
        workers: usize,
    },

    /// Young pause completed
    PauseEnd {
        cycle: u64,
        duration_ms: f64,
        survived_bytes: usize,
        promoted_bytes: usize,
        freed_regions: usize,
    },

    /// Some objects could not be copied and stayed in place
    EvacuationFailure {
        cycle: u64,
        regions: usize,
        objects: usize,
    },

    /// Heap committed more regions after a pause
    HeapExpansion {
        cycle: u64,
        requested_bytes: usize,
        committed_bytes: usize,
        short_term_ratio: f64,
        long_term_ratio: f64,
    },

    /// Tenuring threshold for the next pause
    TenuringThreshold {
        cycle: u64,
        threshold: u8,
        desired_survivor_bytes: usize,
    },

    /// PLAB size for the next pause
    PlabResize {
        cycle: u64,
        destination: String,
        old_words: usize,
        new_words: usize,
    },

    /// Per-worker work during the parallel phase
    WorkerStats {
        cycle: u64,
        worker: usize,
        copy_ms: f64,
        termination_ms: f64,
        steals: usize,
        copied_bytes: usize,
    },
}

/// GC Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Also print events to stdout
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,

    /// Maximum number of events kept in memory
    pub max_events: usize,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            max_events: 4096,
        }
    }
}

impl GcLoggerConfig {
    /// Debug level with console output, as selected by `GcConfig::verbose`
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            console: true,
            ..Default::default()
        }
    }
}

/// GC Logger - centralized logging for GC events
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<Vec<(chrono::DateTime<chrono::Local>, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &GcLoggerConfig {
        &self.config
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a GC event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() {
            return;
        }

        let level = Self::event_level(&event);
        if level > self.config.level {
            return;
        }

        let now = chrono::Local::now();
        let line = self.format(&event, now);
        log::log!(level.as_log(), "{}", line);
        if self.config.console {
            println!("{}", line);
        }

        let mut events = self.events.lock();
        if events.len() >= self.config.max_events {
            events.remove(0);
        }
        events.push((now, event));
    }

    fn event_level(event: &GcEvent) -> LogLevel {
        match event {
            GcEvent::EvacuationFailure { .. } => LogLevel::Warn,
            GcEvent::PauseStart { .. } | GcEvent::PauseEnd { .. } | GcEvent::HeapExpansion { .. } => {
                LogLevel::Info
            }
            GcEvent::TenuringThreshold { .. } | GcEvent::PlabResize { .. } => LogLevel::Debug,
            GcEvent::WorkerStats { .. } => LogLevel::Trace,
        }
    }

    /// Render `event` the way it is written to the log
    pub fn format(&self, event: &GcEvent, now: chrono::DateTime<chrono::Local>) -> String {
        let body = if self.config.json {
            Self::format_json(event)
        } else {
            Self::format_human(event)
        };
        if self.config.timestamps {
            format!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), body)
        } else {
            body
        }
    }

    fn format_json(event: &GcEvent) -> String {
        serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }

    fn format_human(event: &GcEvent) -> String {
        match event {
            GcEvent::PauseStart {
                cycle,
                eden_regions,
                survivor_regions,
                workers,
            } => format!(
                "[GC] Pause Young #{} started ({} eden, {} survivor regions, {} workers)",
                cycle, eden_regions, survivor_regions, workers
            ),
            GcEvent::PauseEnd {
                cycle,
                duration_ms,
                survived_bytes,
                promoted_bytes,
                freed_regions,
            } => format!(
                "[GC] Pause Young #{} {:.3}ms (survived {} bytes, promoted {} bytes, freed {} regions)",
                cycle, duration_ms, survived_bytes, promoted_bytes, freed_regions
            ),
            GcEvent::EvacuationFailure {
                cycle,
                regions,
                objects,
            } => format!(
                "[GC] Pause Young #{}: evacuation failed for {} objects in {} regions",
                cycle, objects, regions
            ),
            GcEvent::HeapExpansion {
                cycle,
                requested_bytes,
                committed_bytes,
                short_term_ratio,
                long_term_ratio,
            } => format!(
                "[GC] Pause Young #{}: heap expanded by {} bytes to {} bytes (GC time ratio short {:.1}%, long {:.1}%)",
                cycle,
                requested_bytes,
                committed_bytes,
                short_term_ratio * 100.0,
                long_term_ratio * 100.0
            ),
            GcEvent::TenuringThreshold {
                cycle,
                threshold,
                desired_survivor_bytes,
            } => format!(
                "[GC] Pause Young #{}: tenuring threshold {} (desired survivor size {} bytes)",
                cycle, threshold, desired_survivor_bytes
            ),
            GcEvent::PlabResize {
                cycle,
                destination,
                old_words,
                new_words,
            } => format!(
                "[GC] Pause Young #{}: {} PLAB {} -> {} words",
                cycle, destination, old_words, new_words
            ),
            GcEvent::WorkerStats {
                cycle,
                worker,
                copy_ms,
                termination_ms,
                steals,
                copied_bytes,
            } => format!(
                "[GC] Pause Young #{}: worker {} copy {:.3}ms termination {:.3}ms steals {} copied {} bytes",
                cycle, worker, copy_ms, termination_ms, steals, copied_bytes
            ),
        }
    }

    pub fn events(&self) -> Vec<GcEvent> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

impl std::fmt::Debug for GcLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcLogger")
            .field("config", &self.config)
            .field("events", &self.event_count())
            .finish()
    }
}
