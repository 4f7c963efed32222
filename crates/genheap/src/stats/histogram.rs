//! Histogram - Pause Time Histogram
//!
//! Logarithmic buckets (1, 2, 4, 8, ...) over microsecond pause times.
//! Percentiles are reported as the upper bound of the bucket they fall in,
//! capped at the largest value seen.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Histogram - pause time distribution
#[derive(Debug)]
pub struct Histogram {
    /// Bucket index to count
    buckets: Mutex<BTreeMap<u32, u64>>,
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    /// Create empty histogram
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    /// Record a value
    pub fn record(&self, value: u64) {
        *self.buckets.lock().entry(Self::bucket(value)).or_insert(0) += 1;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    fn bucket(value: u64) -> u32 {
        64 - value.leading_zeros()
    }

    fn upper_bound(bucket: u32) -> u64 {
        match bucket {
            0 => 0,
            b if b >= 64 => u64::MAX,
            b => (1u64 << b) - 1,
        }
    }

    /// Value below which `p` (0.0 to 1.0) of the records fall
    pub fn percentile(&self, p: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }

        let target = ((total as f64 * p).ceil() as u64).clamp(1, total);
        let buckets = self.buckets.lock();
        let mut cumulative = 0;
        for (&bucket, &count) in buckets.iter() {
            cumulative += count;
            if cumulative >= target {
                return Self::upper_bound(bucket).min(self.max());
            }
        }
        self.max()
    }

    /// Median
    pub fn p50(&self) -> u64 {
        self.percentile(0.50)
    }

    /// 95th percentile
    pub fn p95(&self) -> u64 {
        self.percentile(0.95)
    }

    /// 99th percentile
    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }

    /// Mean value
    pub fn mean(&self) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        self.sum.load(Ordering::Relaxed) / count
    }

    /// Smallest value, 0 when empty
    pub fn min(&self) -> u64 {
        match self.min.load(Ordering::Relaxed) {
            u64::MAX => 0,
            min => min,
        }
    }

    /// Largest value
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Number of records
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Drop every record
    pub fn clear(&self) {
        self.buckets.lock().clear();
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0, Ordering::Relaxed);
        self.min.store(u64::MAX, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
