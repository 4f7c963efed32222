//! Stats Module - GC Performance Monitoring
//!
//! Collects collector statistics for:
//! - Performance tuning
//! - Production monitoring
//! - Debugging & profiling
//!
//! Metrics:
//! - Collection counts per generation
//! - Pause time (min, max, mean, percentiles)
//! - Reclaimed, promoted, relocated and allocated bytes

pub mod histogram;
pub mod timer;

pub use histogram::Histogram;
pub use timer::GcTimer;

use crate::object::GcGeneration;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// What one finished cycle reports to the statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleRecord {
    /// Collection scope
    pub scope: Option<GcGeneration>,
    /// Whether marking ran in the background
    pub background: bool,
    /// Stop-the-world pause
    pub pause: Duration,
    /// Objects reclaimed
    pub reclaimed_objects: usize,
    /// Bytes reclaimed
    pub reclaimed_bytes: usize,
    /// Bytes promoted to an older generation
    pub promoted_bytes: usize,
    /// Bytes moved by compaction
    pub relocated_bytes: usize,
    /// Objects resurrected by their finalizer
    pub resurrected: usize,
}

/// GcStats - statistics collector
///
/// Collection counters are always maintained; the pause histogram and byte
/// totals only when enabled.
#[derive(Debug)]
pub struct GcStats {
    enabled: bool,
    /// Collections per exact scope
    collections: [AtomicU64; 3],
    background_cycles: AtomicU64,
    pause_us: Histogram,
    reclaimed_objects: AtomicU64,
    reclaimed_bytes: AtomicU64,
    promoted_bytes: AtomicU64,
    relocated_bytes: AtomicU64,
    resurrections: AtomicU64,
    allocated_objects: AtomicU64,
    allocated_bytes: AtomicU64,
    start_time: Instant,
}

impl GcStats {
    /// Create stats collector
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            collections: Default::default(),
            background_cycles: AtomicU64::new(0),
            pause_us: Histogram::new(),
            reclaimed_objects: AtomicU64::new(0),
            reclaimed_bytes: AtomicU64::new(0),
            promoted_bytes: AtomicU64::new(0),
            relocated_bytes: AtomicU64::new(0),
            resurrections: AtomicU64::new(0),
            allocated_objects: AtomicU64::new(0),
            allocated_bytes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Whether detailed statistics are collected
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a finished cycle
    pub fn record_collection(&self, record: &CycleRecord) {
        let Some(scope) = record.scope else {
            return;
        };
        self.collections[scope.index()].fetch_add(1, Ordering::Relaxed);
        if record.background {
            self.background_cycles.fetch_add(1, Ordering::Relaxed);
        }
        if !self.enabled {
            return;
        }

        self.pause_us.record(record.pause.as_micros() as u64);
        self.reclaimed_objects
            .fetch_add(record.reclaimed_objects as u64, Ordering::Relaxed);
        self.reclaimed_bytes
            .fetch_add(record.reclaimed_bytes as u64, Ordering::Relaxed);
        self.promoted_bytes
            .fetch_add(record.promoted_bytes as u64, Ordering::Relaxed);
        self.relocated_bytes
            .fetch_add(record.relocated_bytes as u64, Ordering::Relaxed);
        self.resurrections
            .fetch_add(record.resurrected as u64, Ordering::Relaxed);
    }

    /// Record a successful allocation
    pub fn record_allocation(&self, size: usize) {
        if self.enabled {
            self.allocated_objects.fetch_add(1, Ordering::Relaxed);
            self.allocated_bytes.fetch_add(size as u64, Ordering::Relaxed);
        }
    }

    /// Collections that condemned `generation`
    ///
    /// A Gen2 collection counts for Gen0 and Gen1 as well.
    pub fn collection_count(&self, generation: GcGeneration) -> u64 {
        self.collections[generation.index()..]
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    /// Pause time histogram, in microseconds
    pub fn pause_histogram(&self) -> &Histogram {
        &self.pause_us
    }

    /// Summary statistics
    pub fn summary(&self) -> GcSummary {
        let exact = |scope: GcGeneration| self.collections[scope.index()].load(Ordering::Relaxed);
        GcSummary {
            total_cycles: self.collection_count(GcGeneration::Gen0),
            gen0_cycles: exact(GcGeneration::Gen0),
            gen1_cycles: exact(GcGeneration::Gen1),
            gen2_cycles: exact(GcGeneration::Gen2),
            background_cycles: self.background_cycles.load(Ordering::Relaxed),
            avg_pause_us: self.pause_us.mean(),
            p50_pause_us: self.pause_us.p50(),
            p99_pause_us: self.pause_us.p99(),
            max_pause_us: self.pause_us.max(),
            reclaimed_objects: self.reclaimed_objects.load(Ordering::Relaxed),
            reclaimed_bytes: self.reclaimed_bytes.load(Ordering::Relaxed),
            promoted_bytes: self.promoted_bytes.load(Ordering::Relaxed),
            relocated_bytes: self.relocated_bytes.load(Ordering::Relaxed),
            resurrections: self.resurrections.load(Ordering::Relaxed),
            allocated_objects: self.allocated_objects.load(Ordering::Relaxed),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Reset detailed statistics; collection counts are kept
    pub fn reset(&self) {
        self.pause_us.clear();
        for counter in [
            &self.reclaimed_objects,
            &self.reclaimed_bytes,
            &self.promoted_bytes,
            &self.relocated_bytes,
            &self.resurrections,
            &self.allocated_objects,
            &self.allocated_bytes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcSummary {
    /// Total collections
    pub total_cycles: u64,
    /// Gen0-only collections
    pub gen0_cycles: u64,
    /// Gen1 collections
    pub gen1_cycles: u64,
    /// Gen2 collections, background ones included
    pub gen2_cycles: u64,
    /// Gen2 collections marked in the background
    pub background_cycles: u64,
    /// Mean pause (us)
    pub avg_pause_us: u64,
    /// Median pause (us)
    pub p50_pause_us: u64,
    /// 99th percentile pause (us)
    pub p99_pause_us: u64,
    /// Longest pause (us)
    pub max_pause_us: u64,
    /// Objects reclaimed
    pub reclaimed_objects: u64,
    /// Bytes reclaimed
    pub reclaimed_bytes: u64,
    /// Bytes promoted
    pub promoted_bytes: u64,
    /// Bytes moved by compaction
    pub relocated_bytes: u64,
    /// Objects resurrected
    pub resurrections: u64,
    /// Objects allocated
    pub allocated_objects: u64,
    /// Bytes allocated
    pub allocated_bytes: u64,
    /// Uptime (seconds)
    pub uptime_secs: u64,
}
