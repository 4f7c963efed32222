//! GC Logging and Tracing
//!
//! Structured logging for collector operations, useful for:
//! - Pause analysis
//! - Debugging finalization and resurrection
//! - Production monitoring
//!
//! Every event is forwarded to the `log` facade and kept in a bounded
//! per-heap ring so embedders can inspect recent history without installing
//! a logger.
//!
//! Log Levels:
//! - ERROR: Allocation failures
//! - WARN: Resurrections, forced growth beyond a cap
//! - INFO: GC cycles, no-GC regions
//! - DEBUG: Phases, background marking, weak/finalizer counts
//! - TRACE: Per-segment operations

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Log level for GC operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
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
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcEvent {
    /// GC cycle started
    CycleStart {
        cycle: u64,
        generation: String,
        reason: String,
    },

    /// GC phase completed
    PhaseEnd {
        cycle: u64,
        phase: String,
        duration_us: u64,
    },

    /// GC cycle completed
    CycleEnd {
        cycle: u64,
        generation: String,
        duration_us: u64,
        live_objects: usize,
        reclaimed_bytes: usize,
        promoted_bytes: usize,
    },

    /// Object awaiting finalization was reached from a root again
    Resurrection { cycle: u64, address: usize },

    /// Weak references cleared in a cycle
    WeakCleared { cycle: u64, count: usize },

    /// Objects handed to the finalizer channel in a cycle
    FinalizersQueued { cycle: u64, count: usize },

    /// Allocation failure
    AllocationFailure { size: usize, committed: usize },

    /// A space mapped a new segment
    SegmentGrowth {
        generation: String,
        segment_size: usize,
        beyond_cap: bool,
    },

    /// Background marking transition
    BackgroundMark { epoch: u64, phase: String },

    /// No-GC region entered or left
    NoGcRegion { entered: bool, budget: usize },

    /// Latency mode changed
    LatencyChange { from: String, to: String },
}

impl GcEvent {
    /// Get log level for event
    pub fn level(&self) -> LogLevel {
        match self {
            GcEvent::AllocationFailure { .. } => LogLevel::Error,
            GcEvent::Resurrection { .. } => LogLevel::Warn,
            GcEvent::SegmentGrowth { beyond_cap, .. } => {
                if *beyond_cap {
                    LogLevel::Warn
                } else {
                    LogLevel::Trace
                }
            },
            GcEvent::CycleStart { .. }
            | GcEvent::CycleEnd { .. }
            | GcEvent::NoGcRegion { .. }
            | GcEvent::LatencyChange { .. } => LogLevel::Info,
            GcEvent::PhaseEnd { .. }
            | GcEvent::WeakCleared { .. }
            | GcEvent::FinalizersQueued { .. }
            | GcEvent::BackgroundMark { .. } => LogLevel::Debug,
        }
    }

    fn is_cycle_summary(&self) -> bool {
        matches!(self, GcEvent::CycleStart { .. } | GcEvent::CycleEnd { .. })
    }

    /// Human-readable rendering
    pub fn describe(&self) -> String {
        match self {
            GcEvent::CycleStart {
                cycle,
                generation,
                reason,
            } => format!(
                "[GC] Cycle {} started ({}, reason: {})",
                cycle, generation, reason
            ),
            GcEvent::PhaseEnd {
                cycle,
                phase,
                duration_us,
            } => format!(
                "[GC] Cycle {}: {} phase completed ({} us)",
                cycle, phase, duration_us
            ),
            GcEvent::CycleEnd {
                cycle,
                generation,
                duration_us,
                live_objects,
                reclaimed_bytes,
                promoted_bytes,
            } => format!(
                "[GC] Cycle {} completed ({}, {} us, {} live, reclaimed {} bytes, promoted {} bytes)",
                cycle, generation, duration_us, live_objects, reclaimed_bytes, promoted_bytes
            ),
            GcEvent::Resurrection { cycle, address } => format!(
                "[GC] Cycle {}: object {:#x} resurrected while awaiting finalization",
                cycle, address
            ),
            GcEvent::WeakCleared { cycle, count } => {
                format!("[GC] Cycle {}: {} weak references cleared", cycle, count)
            },
            GcEvent::FinalizersQueued { cycle, count } => {
                format!("[GC] Cycle {}: {} objects queued for finalization", cycle, count)
            },
            GcEvent::AllocationFailure { size, committed } => format!(
                "[GC] Allocation failure: {} bytes (committed: {})",
                size, committed
            ),
            GcEvent::SegmentGrowth {
                generation,
                segment_size,
                beyond_cap,
            } => format!(
                "[GC] {} mapped a {} byte segment{}",
                generation,
                segment_size,
                if *beyond_cap { " beyond its cap" } else { "" }
            ),
            GcEvent::BackgroundMark { epoch, phase } => {
                format!("[GC] Background mark epoch {}: {}", epoch, phase)
            },
            GcEvent::NoGcRegion { entered, budget } => {
                if *entered {
                    format!("[GC] Entered no-GC region ({} bytes)", budget)
                } else {
                    format!("[GC] Left no-GC region ({} bytes unused)", budget)
                }
            },
            GcEvent::LatencyChange { from, to } => {
                format!("[GC] Latency mode {} -> {}", from, to)
            },
        }
    }
}

/// GC Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Keep cycle summaries at Info even when `level` is lower
    pub verbose: bool,

    /// Number of events kept in memory
    pub capacity: usize,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            verbose: false,
            capacity: 1024,
        }
    }
}

impl From<&crate::config::GcConfig> for GcLoggerConfig {
    fn from(config: &crate::config::GcConfig) -> Self {
        Self {
            level: config.log_level,
            verbose: config.verbose,
            capacity: config.event_log_capacity,
        }
    }
}

/// Per-heap GC logger
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<VecDeque<(DateTime<Local>, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    /// Create new GC logger
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(config.capacity.min(4096))),
            config,
            enabled: AtomicBool::new(true),
        }
    }

    /// Enable logging
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable logging
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a GC event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() {
            return;
        }

        let level = event.level();
        let forced = self.config.verbose && event.is_cycle_summary();
        if level > self.config.level && !forced {
            return;
        }

        let emit_level = if forced { LogLevel::Info } else { level };
        log::log!(target: "genheap", emit_level.as_log(), "{}", event.describe());

        if self.config.capacity == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() == self.config.capacity {
            events.pop_front();
        }
        events.push_back((Local::now(), event));
    }

    /// Get all retained events, oldest first
    pub fn events(&self) -> Vec<(DateTime<Local>, GcEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    /// Render retained events as JSON lines
    pub fn to_json_lines(&self) -> String {
        let events = self.events.lock();
        let mut out = String::new();
        for (timestamp, event) in events.iter() {
            let line = serde_json::json!({
                "timestamp": timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                "event": event,
            });
            if let Ok(json) = serde_json::to_string(&line) {
                out.push_str(&json);
                out.push('\n');
            }
        }
        out
    }

    /// Clear all events
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}
