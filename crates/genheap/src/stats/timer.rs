//! GC Timer - Timing Utilities
//!
//! Measures cycle and phase durations with a monotonic clock.

use std::time::{Duration, Instant};

/// GcTimer - timer for measuring GC operations
#[derive(Debug, Clone, Copy)]
pub struct GcTimer {
    start: Instant,
}

impl GcTimer {
    /// Start a timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed microseconds
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }

    /// Elapsed milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Elapsed microseconds since the last lap, restarting the timer
    pub fn lap_us(&mut self) -> u64 {
        let now = Instant::now();
        let lap = now.duration_since(self.start).as_micros() as u64;
        self.start = now;
        lap
    }
}

impl Default for GcTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lap_restarts() {
        let mut timer = GcTimer::new();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.lap_us() >= 2000);
        assert!(timer.elapsed() < Duration::from_secs(1));
        assert!(timer.elapsed_ms() >= 0.0);
    }
}
