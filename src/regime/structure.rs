//! Swing structure, momentum and range analysis over a bar window

use serde::{Deserialize, Serialize};

use crate::common::math::{linear_slope, percentile};
use crate::common::types::{to_f64, Bar, Side};
use crate::config::types::RegimeConfig;

/// Higher-high / higher-low / lower-high / lower-low counts between pivots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureCounts {
    pub higher_highs: u32,
    pub higher_lows: u32,
    pub lower_highs: u32,
    pub lower_lows: u32,
}

impl StructureCounts {
    pub fn bullish(&self) -> u32 {
        self.higher_highs + self.higher_lows
    }

    pub fn bearish(&self) -> u32 {
        self.lower_highs + self.lower_lows
    }

    pub fn total(&self) -> u32 {
        self.bullish() + self.bearish()
    }

    /// Side with strictly more structure points; ties have none
    pub fn dominant(&self) -> Option<Side> {
        match self.bullish().cmp(&self.bearish()) {
            std::cmp::Ordering::Greater => Some(Side::Long),
            std::cmp::Ordering::Less => Some(Side::Short),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn dominant_count(&self) -> u32 {
        self.bullish().max(self.bearish())
    }

    /// Dominant share of all structure points, 0 when there are none
    pub fn score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.dominant_count() as f64 / total as f64
        }
    }
}

/// Bar series projected to f64 for analysis
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub closes: Vec<f64>,
}

impl Series {
    pub fn from_bars<'a>(bars: impl IntoIterator<Item = &'a Bar>) -> Self {
        let mut series = Series::default();
        for bar in bars {
            series.highs.push(to_f64(bar.high));
            series.lows.push(to_f64(bar.low));
            series.closes.push(to_f64(bar.close));
        }
        series
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

fn pivots(values: &[f64], wing: usize, is_pivot: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    if values.len() < 2 * wing + 1 {
        return Vec::new();
    }
    (wing..values.len() - wing)
        .filter(|&i| {
            let v = values[i];
            (i - wing..=i + wing)
                .filter(|&j| j != i)
                .all(|j| is_pivot(v, values[j]))
        })
        .map(|i| values[i])
        .collect()
}

/// Pivot highs and lows that beat `wing` bars on each side
pub fn swing_points(series: &Series, wing: usize) -> (Vec<f64>, Vec<f64>) {
    let highs = pivots(&series.highs, wing, |v, other| v > other);
    let lows = pivots(&series.lows, wing, |v, other| v < other);
    (highs, lows)
}

pub fn structure_counts(series: &Series, wing: usize) -> StructureCounts {
    let (highs, lows) = swing_points(series, wing);
    let mut counts = StructureCounts::default();
    for pair in highs.windows(2) {
        if pair[1] > pair[0] {
            counts.higher_highs += 1;
        } else if pair[1] < pair[0] {
            counts.lower_highs += 1;
        }
    }
    for pair in lows.windows(2) {
        if pair[1] > pair[0] {
            counts.higher_lows += 1;
        } else if pair[1] < pair[0] {
            counts.lower_lows += 1;
        }
    }
    counts
}

/// Close-to-close regression slope in ticks per bar
pub fn slope_ticks(series: &Series, tick: f64) -> f64 {
    linear_slope(&series.closes).unwrap_or(0.0) / tick
}

/// Blend of 5- and 10-bar moves in ticks, signed
pub fn momentum_ticks(series: &Series, tick: f64) -> f64 {
    let closes = &series.closes;
    let n = closes.len();
    let change = |lag: usize| {
        if n > lag {
            (closes[n - 1] - closes[n - 1 - lag]) / tick
        } else {
            0.0
        }
    };
    0.6 * change(5) + 0.4 * change(10)
}

/// Accepted trading range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeLevels {
    pub support: f64,
    pub resistance: f64,
    pub size_ticks: f64,
    pub support_tests: usize,
    pub resistance_tests: usize,
    pub respect_rate: f64,
}

/// Find a range whose edges are tested and respected, if one exists
pub fn detect_range(series: &Series, tick: f64, config: &RegimeConfig) -> Option<RangeLevels> {
    if series.is_empty() {
        return None;
    }
    let support = percentile(&series.lows, 0.10)?;
    let resistance = percentile(&series.highs, 0.90)?;
    let size_ticks = (resistance - support) / tick;
    if size_ticks < config.min_range_ticks || size_ticks > config.max_range_ticks {
        return None;
    }

    let tolerance = config.level_test_tolerance_ticks * tick;
    let support_tests = series
        .lows
        .iter()
        .filter(|low| (*low - support).abs() <= tolerance)
        .count();
    let resistance_tests = series
        .highs
        .iter()
        .filter(|high| (*high - resistance).abs() <= tolerance)
        .count();
    let inside = series
        .closes
        .iter()
        .filter(|c| **c >= support - tolerance && **c <= resistance + tolerance)
        .count();
    let respect_rate = inside as f64 / series.len() as f64;

    if support_tests < config.min_level_tests
        || resistance_tests < config.min_level_tests
        || respect_rate < config.range_respect_rate
    {
        return None;
    }

    Some(RangeLevels {
        support,
        resistance,
        size_ticks,
        support_tests,
        resistance_tests,
        respect_rate,
    })
}
