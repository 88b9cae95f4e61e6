use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::common::timing::{LatencyStats, LatencyTracker};
use crate::features::CacheStats;
use crate::strategy::{TradingDecision, Verdict};

/// Running counters across every decided tick
#[derive(Debug)]
pub struct EngineStats {
    inner: Mutex<Counters>,
}

#[derive(Debug)]
struct Counters {
    ticks: u64,
    trades: u64,
    no_trades: BTreeMap<String, u64>,
    tiers: BTreeMap<String, u64>,
    detector_failures: BTreeMap<String, u64>,
    degraded_features: BTreeMap<String, u64>,
    latency: LatencyTracker,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatsSnapshot {
    pub ticks: u64,
    pub trades: u64,
    /// No-trade counts keyed by reason
    pub no_trades: BTreeMap<String, u64>,
    /// Decision counts keyed by quality tier
    pub tiers: BTreeMap<String, u64>,
    pub detector_failures: BTreeMap<String, u64>,
    pub degraded_features: BTreeMap<String, u64>,
    pub cache: CacheStats,
    pub latency: LatencyStats,
}

impl EngineStats {
    pub fn new(latency_window: usize) -> Self {
        Self {
            inner: Mutex::new(Counters {
                ticks: 0,
                trades: 0,
                no_trades: BTreeMap::new(),
                tiers: BTreeMap::new(),
                detector_failures: BTreeMap::new(),
                degraded_features: BTreeMap::new(),
                latency: LatencyTracker::new(latency_window),
            }),
        }
    }

    pub fn record(&self, decision: &TradingDecision, elapsed: Duration) {
        let mut counters = self.inner.lock();
        counters.ticks += 1;
        match &decision.verdict {
            Verdict::Trade(_) => counters.trades += 1,
            Verdict::NoTrade { reason } => {
                *counters.no_trades.entry(reason.to_string()).or_default() += 1;
            }
        }
        *counters.tiers.entry(decision.tier.to_string()).or_default() += 1;
        for name in &decision.failed_detectors {
            *counters.detector_failures.entry(name.clone()).or_default() += 1;
        }
        for feature in &decision.degraded_features {
            *counters
                .degraded_features
                .entry(feature.to_string())
                .or_default() += 1;
        }
        counters.latency.record(elapsed);
    }

    pub fn snapshot(&self, cache: CacheStats) -> EngineStatsSnapshot {
        let counters = self.inner.lock();
        EngineStatsSnapshot {
            ticks: counters.ticks,
            trades: counters.trades,
            no_trades: counters.no_trades.clone(),
            tiers: counters.tiers.clone(),
            detector_failures: counters.detector_failures.clone(),
            degraded_features: counters.degraded_features.clone(),
            cache,
            latency: counters.latency.stats(),
        }
    }
}
