//! Tick Timing Utilities
//!
//! Wall-clock accounting for the decision path.
//!
//! # Usage
//!
//! ```rust
//! use confluence_engine::common::timing::{LatencyTracker, TickBudget};
//! use std::time::Duration;
//!
//! let budget = TickBudget::start(Duration::from_millis(50));
//! // ... run a stage ...
//! assert!(!budget.exceeded());
//!
//! let mut tracker = LatencyTracker::new(256);
//! tracker.record(budget.elapsed());
//! println!("{}", tracker.stats());
//! ```

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Deadline for a single evaluation tick
#[derive(Debug, Clone, Copy)]
pub struct TickBudget {
    started_at: Instant,
    budget: Duration,
}

impl TickBudget {
    /// Start the clock now
    pub fn start(budget: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn exceeded(&self) -> bool {
        self.elapsed() > self.budget
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Statistics over the recorded tick latencies
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    /// Number of samples in the window
    pub samples: usize,
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
    pub median: Duration,
    /// 95th percentile
    pub p95: Duration,
    /// 99th percentile
    pub p99: Duration,
    /// Standard deviation (in nanoseconds)
    pub std_dev_nanos: f64,
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Latency] {} ticks", self.samples)?;
        writeln!(f, "  Average:    {:?}", self.average)?;
        writeln!(f, "  Min:        {:?}", self.min)?;
        writeln!(f, "  Max:        {:?}", self.max)?;
        writeln!(f, "  Median:     {:?}", self.median)?;
        writeln!(f, "  P95:        {:?}", self.p95)?;
        writeln!(f, "  P99:        {:?}", self.p99)?;
        write!(f, "  Std Dev:    {:.2} µs", self.std_dev_nanos / 1000.0)
    }
}

/// Rolling window of tick latencies
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    window: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, dropping the oldest once the window is full
    pub fn record(&mut self, duration: Duration) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(duration);
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn stats(&self) -> LatencyStats {
        calculate_stats(self.window.iter().copied().collect())
    }
}

/// Calculate statistics from collected durations
fn calculate_stats(mut durations: Vec<Duration>) -> LatencyStats {
    let samples = durations.len();
    if samples == 0 {
        return LatencyStats::default();
    }

    // Sort for percentile calculations
    durations.sort();

    let min = durations[0];
    let max = durations[samples - 1];
    let median = durations[samples / 2];
    let p95 = durations[((samples as f64 * 0.95) as usize).min(samples - 1)];
    let p99 = durations[((samples as f64 * 0.99) as usize).min(samples - 1)];

    let total_nanos: u128 = durations.iter().map(|d| d.as_nanos()).sum();
    let average = Duration::from_nanos((total_nanos / samples as u128) as u64);

    let avg_nanos = average.as_nanos() as f64;
    let variance: f64 = durations
        .iter()
        .map(|d| {
            let diff = d.as_nanos() as f64 - avg_nanos;
            diff * diff
        })
        .sum::<f64>()
        / samples as f64;

    LatencyStats {
        samples,
        average,
        min,
        max,
        median,
        p95,
        p99,
        std_dev_nanos: variance.sqrt(),
    }
}
