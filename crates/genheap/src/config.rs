//! Configuration Module - GC Tuning Parameters
//!
//! Manages all configuration parameters for the heap.
//! Proper configuration balances throughput, latency, and memory footprint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Latency mode for the trigger controller
///
/// Changes timing only, never correctness: it scales the Gen1/Gen2 trigger
/// thresholds and decides whether Gen2 collections run in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LatencyMode {
    /// Throughput first; Gen2 is always a blocking collection
    Batch,
    /// Default; Gen2 runs in the background when enabled
    Interactive,
    /// Defers Gen2 as long as possible and prefers background marking
    LowLatency,
}

impl LatencyMode {
    /// Multiplier applied to the Gen2 trigger threshold
    pub fn gen2_scale(self) -> u64 {
        match self {
            LatencyMode::Batch | LatencyMode::Interactive => 1,
            LatencyMode::LowLatency => 4,
        }
    }

    /// Multiplier applied to the Gen1 survivor threshold
    pub fn gen1_scale(self) -> u64 {
        match self {
            LatencyMode::Batch | LatencyMode::Interactive => 1,
            LatencyMode::LowLatency => 2,
        }
    }

    /// Whether this mode prefers background Gen2 marking
    pub fn prefers_background(self) -> bool {
        !matches!(self, LatencyMode::Batch)
    }
}

impl Default for LatencyMode {
    fn default() -> Self {
        LatencyMode::Interactive
    }
}

impl fmt::Display for LatencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyMode::Batch => write!(f, "batch"),
            LatencyMode::Interactive => write!(f, "interactive"),
            LatencyMode::LowLatency => write!(f, "low-latency"),
        }
    }
}

impl FromStr for LatencyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(LatencyMode::Batch),
            "interactive" => Ok(LatencyMode::Interactive),
            "low-latency" | "lowlatency" | "low_latency" => Ok(LatencyMode::LowLatency),
            other => Err(ConfigError::InvalidLatencyMode(other.to_string())),
        }
    }
}

/// Main configuration for the managed heap
///
/// Stores all parameters affecting GC behavior.
/// Most parameters have sensible defaults.
///
/// # Examples
///
/// ```rust
/// use genheap::{GcConfig, LatencyMode};
///
/// // Use default configuration
/// let config = GcConfig::default();
/// assert!(config.validate().is_ok());
///
/// // Throughput-oriented configuration
/// let config = GcConfig {
///     latency_mode: LatencyMode::Batch,
///     background_gc: false,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    /// Size of each Gen0 segment in bytes
    ///
    /// Gen0 exhaustion is the primary collection trigger.
    /// Default: 256KB
    pub gen0_segment_size: usize,

    /// Maximum total Gen0 size in bytes
    ///
    /// Gen0 grows by whole segments up to this cap when a collection did not
    /// free enough room.
    /// Default: 4MB
    pub gen0_max_size: usize,

    /// Size of each Gen1 segment in bytes
    ///
    /// Default: 1MB
    pub gen1_segment_size: usize,

    /// Size of each Gen2 segment in bytes
    ///
    /// Default: 4MB
    pub gen2_segment_size: usize,

    /// Minimum size of each large object heap segment in bytes
    ///
    /// Default: 16MB
    pub loh_segment_size: usize,

    /// Objects of at least this many bytes go to the large object heap
    ///
    /// Default: 85,000 bytes
    pub loh_threshold: usize,

    /// Hard limit on committed bytes across all spaces
    ///
    /// Mutator-driven growth fails with `AllocationFailure` beyond this.
    /// Default: 256MB
    pub max_heap_size: usize,

    /// Bytes promoted by one Gen0 collection that count towards Gen1 escalation
    ///
    /// Default: 64KB
    pub gen1_survivor_threshold: usize,

    /// Consecutive over-threshold Gen0 collections before escalating to Gen1
    ///
    /// Default: 2
    pub gen1_escalation_streak: u32,

    /// Bytes allocated/promoted since the last Gen2 that trigger a Gen2
    ///
    /// Memory pressure hints are added to the counter before comparison.
    /// Default: 32MB
    pub gen2_trigger_bytes: usize,

    /// Bytes allocated on the large object heap since the last Gen2 that trigger a Gen2
    ///
    /// Default: 16MB
    pub loh_trigger_bytes: usize,

    /// Initial latency mode
    ///
    /// Default: Interactive
    pub latency_mode: LatencyMode,

    /// Enable background Gen2 marking
    ///
    /// Default: true
    pub background_gc: bool,

    /// Objects traced per background marking quantum
    ///
    /// Mutators may run between quanta.
    /// Default: 256
    pub background_mark_quantum: usize,

    /// Enable verbose GC logging
    ///
    /// Logs cycle summaries at info level regardless of `log_level`.
    /// Default: false
    pub verbose: bool,

    /// Minimum level of recorded GC events
    ///
    /// Default: Info
    pub log_level: crate::logging::LogLevel,

    /// Number of recent GC events kept in memory
    ///
    /// Default: 1024
    pub event_log_capacity: usize,

    /// Enable GC statistics collection
    ///
    /// Default: true
    pub stats_enabled: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            gen0_segment_size: 256 * KB,
            gen0_max_size: 4 * MB,
            gen1_segment_size: MB,
            gen2_segment_size: 4 * MB,
            loh_segment_size: 16 * MB,
            loh_threshold: 85_000,
            max_heap_size: 256 * MB,

            gen1_survivor_threshold: 64 * KB,
            gen1_escalation_streak: 2,
            gen2_trigger_bytes: 32 * MB,
            loh_trigger_bytes: 16 * MB,

            latency_mode: LatencyMode::Interactive,
            background_gc: true,
            background_mark_quantum: 256,

            verbose: false,
            log_level: crate::logging::LogLevel::Info,
            event_log_capacity: 1024,
            stats_enabled: true,
        }
    }
}

impl GcConfig {
    /// Validate configuration
    ///
    /// Checks if all values are in valid ranges.
    /// Returns error if configuration is invalid.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use genheap::GcConfig;
    ///
    /// let config = GcConfig {
    ///     max_heap_size: 0,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_heap_size == 0 {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_size must be > 0".to_string(),
            ));
        }

        for (name, size) in [
            ("gen0_segment_size", self.gen0_segment_size),
            ("gen1_segment_size", self.gen1_segment_size),
            ("gen2_segment_size", self.gen2_segment_size),
            ("loh_segment_size", self.loh_segment_size),
        ] {
            if size < 4 * KB {
                return Err(ConfigError::InvalidSegmentSize(format!(
                    "{} must be at least 4KB",
                    name
                )));
            }
        }

        if self.gen0_max_size < self.gen0_segment_size {
            return Err(ConfigError::InvalidSegmentSize(
                "gen0_max_size must be >= gen0_segment_size".to_string(),
            ));
        }

        let initial = self.gen0_segment_size + self.gen1_segment_size + self.gen2_segment_size;
        if initial > self.max_heap_size {
            return Err(ConfigError::InvalidHeapSize(
                "initial segments exceed max_heap_size".to_string(),
            ));
        }

        if self.loh_threshold == 0 || self.loh_threshold > u32::MAX as usize {
            return Err(ConfigError::InvalidThreshold(
                "loh_threshold must be in 1..=u32::MAX".to_string(),
            ));
        }

        if self.loh_threshold > self.gen0_segment_size {
            return Err(ConfigError::InvalidThreshold(
                "loh_threshold must fit inside a gen0 segment".to_string(),
            ));
        }

        if self.gen1_escalation_streak == 0 {
            return Err(ConfigError::InvalidThreshold(
                "gen1_escalation_streak must be > 0".to_string(),
            ));
        }

        if self.gen2_trigger_bytes == 0 {
            return Err(ConfigError::InvalidThreshold(
                "gen2_trigger_bytes must be > 0".to_string(),
            ));
        }

        if self.background_mark_quantum == 0 {
            return Err(ConfigError::InvalidThreshold(
                "background_mark_quantum must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - GENHEAP_MAX_HEAP
    /// - GENHEAP_GEN0_SIZE
    /// - GENHEAP_LATENCY_MODE
    /// - GENHEAP_BACKGROUND_GC
    /// - GENHEAP_VERBOSE
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GENHEAP_MAX_HEAP") {
            match val.parse::<usize>() {
                Ok(size) => config.max_heap_size = size,
                Err(_) => log::warn!("ignoring GENHEAP_MAX_HEAP={}", val),
            }
        }

        if let Ok(val) = std::env::var("GENHEAP_GEN0_SIZE") {
            match val.parse::<usize>() {
                Ok(size) => config.gen0_segment_size = size,
                Err(_) => log::warn!("ignoring GENHEAP_GEN0_SIZE={}", val),
            }
        }

        if let Ok(val) = std::env::var("GENHEAP_LATENCY_MODE") {
            match val.parse::<LatencyMode>() {
                Ok(mode) => config.latency_mode = mode,
                Err(e) => log::warn!("ignoring GENHEAP_LATENCY_MODE: {}", e),
            }
        }

        if let Ok(val) = std::env::var("GENHEAP_BACKGROUND_GC") {
            config.background_gc = val == "1" || val.eq_ignore_ascii_case("true");
        }

        if let Ok(val) = std::env::var("GENHEAP_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid heap size: {0}")]
    InvalidHeapSize(String),

    #[error("Invalid segment size: {0}")]
    InvalidSegmentSize(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid latency mode: {0}")]
    InvalidLatencyMode(String),
}

// ============================================================================
// CONSTANTS
// ============================================================================

pub(crate) const KB: usize = 1024;
pub(crate) const MB: usize = 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.loh_threshold, 85_000);
        assert_eq!(config.latency_mode, LatencyMode::Interactive);
    }

    #[test]
    fn test_invalid_heap_size() {
        let config = GcConfig {
            max_heap_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gen0_cap_below_segment() {
        let config = GcConfig {
            gen0_max_size: 8 * KB,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSegmentSize(_))
        ));
    }

    #[test]
    fn test_latency_mode_parse() {
        assert_eq!("batch".parse::<LatencyMode>().unwrap(), LatencyMode::Batch);
        assert_eq!(
            "Low-Latency".parse::<LatencyMode>().unwrap(),
            LatencyMode::LowLatency
        );
        assert!("turbo".parse::<LatencyMode>().is_err());
    }

    #[test]
    fn test_latency_scaling() {
        assert_eq!(LatencyMode::Batch.gen2_scale(), 1);
        assert_eq!(LatencyMode::LowLatency.gen2_scale(), 4);
        assert!(!LatencyMode::Batch.prefers_background());
        assert!(LatencyMode::Interactive.prefers_background());
    }
}
