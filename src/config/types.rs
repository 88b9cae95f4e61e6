//! Configuration types

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::errors::{EngineError, Result};
use crate::features::{FeatureName, FeatureWeights, QualityThresholds, TierMultipliers};

/// Main engine configuration
///
/// Loaded once at start-up and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Feature weights, cache and feature parameters
    #[serde(default)]
    pub features: FeatureConfig,
    /// Quality tier cutoffs and size multipliers
    #[serde(default)]
    pub quality: QualityConfig,
    /// Regime classification thresholds
    #[serde(default)]
    pub regime: RegimeConfig,
    /// Candidate scoring
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Pattern re-fire suppression
    #[serde(default)]
    pub cooldown: CooldownConfig,
    /// Trend and range strategy parameters
    #[serde(default)]
    pub strategies: StrategyConfig,
    /// Per-detector thresholds
    #[serde(default)]
    pub detectors: DetectorConfig,
    /// General engine settings
    #[serde(default)]
    pub settings: EngineSettings,
}

impl EngineConfig {
    /// Reject configurations the engine must not run with
    pub fn validate(&self) -> Result<()> {
        self.features.weights.validate()?;
        self.quality.thresholds.validate()?;
        self.scoring.validate()?;
        self.regime.validate()?;
        if self.settings.tick_budget_ms == 0 {
            return Err(EngineError::Configuration(
                "settings.tick_budget_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Feature calculator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub weights: FeatureWeights,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Distance (ticks) over which gamma levels lose their pull
    #[serde(default = "default_gamma_span_ticks")]
    pub gamma_span_ticks: f64,
    /// Distance (ticks) over which profile levels lose their pull
    #[serde(default = "default_level_span_ticks")]
    pub level_span_ticks: f64,
    /// Bars used for slope and consistency
    #[serde(default = "default_slope_periods")]
    pub slope_periods: usize,
    /// Bars used for relative volume and pullback range
    #[serde(default = "default_lookback")]
    pub lookback: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
            cache: CacheConfig::default(),
            gamma_span_ticks: default_gamma_span_ticks(),
            level_span_ticks: default_level_span_ticks(),
            slope_periods: default_slope_periods(),
            lookback: default_lookback(),
        }
    }
}

fn default_gamma_span_ticks() -> f64 {
    100.0
}

fn default_level_span_ticks() -> f64 {
    8.0
}

fn default_slope_periods() -> usize {
    10
}

fn default_lookback() -> usize {
    10
}

/// Feature memo configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// TTL per cached feature; features not listed are always recomputed
    #[serde(default = "default_cache_ttls")]
    pub ttl_seconds: BTreeMap<FeatureName, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_seconds: default_cache_ttls(),
        }
    }
}

fn default_cache_max_entries() -> usize {
    1024
}

fn default_cache_ttls() -> BTreeMap<FeatureName, u64> {
    BTreeMap::from([
        (FeatureName::PatternStrength, 30),
        (FeatureName::GammaProximity, 30),
    ])
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub thresholds: QualityThresholds,
    #[serde(default)]
    pub multipliers: TierMultipliers,
}

/// Regime classification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Bars examined for swing structure
    pub structure_window: usize,
    /// Below this many bars the regime is unclear
    pub min_bars: usize,
    /// Bars on each side a pivot must beat
    pub pivot_wing: usize,
    /// Slope (ticks per bar) that saturates the slope score
    pub slope_normalizer: f64,
    pub strong_trend_threshold: f64,
    pub weak_trend_threshold: f64,
    pub strong_min_slope_ticks: f64,
    pub weak_min_slope_ticks: f64,
    pub min_range_ticks: f64,
    pub max_range_ticks: f64,
    pub min_level_tests: usize,
    pub level_test_tolerance_ticks: f64,
    /// Fraction of closes that must stay inside a range
    pub range_respect_rate: f64,
    /// Higher-timeframe slope needed to bias a range
    pub htf_min_slope_ticks: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            structure_window: 30,
            min_bars: 10,
            pivot_wing: 2,
            slope_normalizer: 2.0,
            strong_trend_threshold: 0.70,
            weak_trend_threshold: 0.50,
            strong_min_slope_ticks: 0.5,
            weak_min_slope_ticks: 0.2,
            min_range_ticks: 12.0,
            max_range_ticks: 50.0,
            min_level_tests: 3,
            level_test_tolerance_ticks: 1.5,
            range_respect_rate: 0.75,
            htf_min_slope_ticks: 0.2,
        }
    }
}

impl RegimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.weak_trend_threshold >= self.strong_trend_threshold {
            return Err(EngineError::Configuration(format!(
                "regime.weak_trend_threshold ({}) must be below regime.strong_trend_threshold ({})",
                self.weak_trend_threshold, self.strong_trend_threshold
            )));
        }
        if self.min_range_ticks >= self.max_range_ticks {
            return Err(EngineError::Configuration(format!(
                "regime.min_range_ticks ({}) must be below regime.max_range_ticks ({})",
                self.min_range_ticks, self.max_range_ticks
            )));
        }
        if self.pivot_wing == 0 || self.slope_normalizer <= 0.0 {
            return Err(EngineError::Configuration(
                "regime.pivot_wing and regime.slope_normalizer must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Candidate scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of the candidate's own confidence
    #[serde(default = "default_confidence_weight")]
    pub confidence_weight: f64,
    /// Weight of the tick's confluence score
    #[serde(default = "default_confluence_weight")]
    pub confluence_weight: f64,
    /// Added when the side agrees with a locked bias
    #[serde(default = "default_alignment_bonus")]
    pub alignment_bonus: f64,
    /// Added to breakout patterns in a strong trend
    #[serde(default = "default_breakout_trend_bonus")]
    pub breakout_trend_bonus: f64,
    /// Added to reversion patterns in a range
    #[serde(default = "default_reversion_range_bonus")]
    pub reversion_range_bonus: f64,
    /// Candidates below this confidence are not scored
    #[serde(default = "default_min_candidate_confidence")]
    pub min_candidate_confidence: f64,
    /// Winners risking more than this many ticks are not traded
    #[serde(default = "default_max_risk_ticks")]
    pub max_risk_ticks: f64,
    /// Minimum reward/risk of the farthest target for a winner to trade
    #[serde(default = "default_min_reward_risk")]
    pub min_reward_risk: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            confidence_weight: default_confidence_weight(),
            confluence_weight: default_confluence_weight(),
            alignment_bonus: default_alignment_bonus(),
            breakout_trend_bonus: default_breakout_trend_bonus(),
            reversion_range_bonus: default_reversion_range_bonus(),
            min_candidate_confidence: default_min_candidate_confidence(),
            max_risk_ticks: default_max_risk_ticks(),
            min_reward_risk: default_min_reward_risk(),
        }
    }
}

fn default_confidence_weight() -> f64 {
    0.6
}

fn default_confluence_weight() -> f64 {
    0.4
}

fn default_alignment_bonus() -> f64 {
    0.05
}

fn default_breakout_trend_bonus() -> f64 {
    0.06
}

fn default_reversion_range_bonus() -> f64 {
    0.04
}

fn default_min_candidate_confidence() -> f64 {
    0.60
}

fn default_max_risk_ticks() -> f64 {
    20.0
}

fn default_min_reward_risk() -> f64 {
    1.2
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = [self.confidence_weight, self.confluence_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::InvalidScoring(
                "score weights must be finite and non-negative".to_string(),
            ));
        }
        let sum = self.confidence_weight + self.confluence_weight;
        if (sum - 1.0).abs() > crate::features::WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidScoring(format!(
                "confidence_weight + confluence_weight must be 1.0, got {}",
                sum
            )));
        }
        let bonuses = [
            self.alignment_bonus,
            self.breakout_trend_bonus,
            self.reversion_range_bonus,
        ];
        if bonuses.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(EngineError::InvalidScoring(
                "bonuses must be finite and non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_candidate_confidence) {
            return Err(EngineError::InvalidScoring(format!(
                "min_candidate_confidence must be within [0, 1], got {}",
                self.min_candidate_confidence
            )));
        }
        if !self.max_risk_ticks.is_finite() || self.max_risk_ticks <= 0.0 {
            return Err(EngineError::InvalidScoring(format!(
                "max_risk_ticks must be positive, got {}",
                self.max_risk_ticks
            )));
        }
        if !self.min_reward_risk.is_finite() || self.min_reward_risk < 0.0 {
            return Err(EngineError::InvalidScoring(format!(
                "min_reward_risk must be finite and non-negative, got {}",
                self.min_reward_risk
            )));
        }
        Ok(())
    }
}

/// Pattern re-fire suppression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownConfig {
    #[serde(default = "default_cooldown_seconds")]
    pub default_seconds: u64,
    /// Per-pattern overrides keyed by detector name
    #[serde(default)]
    pub overrides: BTreeMap<String, u64>,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            default_seconds: default_cooldown_seconds(),
            overrides: BTreeMap::new(),
        }
    }
}

fn default_cooldown_seconds() -> u64 {
    60
}

impl CooldownConfig {
    pub fn window_for(&self, pattern: &str) -> Duration {
        let secs = self
            .overrides
            .get(pattern)
            .copied()
            .unwrap_or(self.default_seconds);
        Duration::seconds(secs as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default)]
    pub range: RangeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub min_confidence: f64,
    /// Stop distance in ATR multiples
    pub stop_atr_multiple: f64,
    pub reward_risk: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.55,
            stop_atr_multiple: 1.5,
            reward_risk: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// How close (ticks) price must be to a range edge
    pub proximity_ticks: f64,
    pub min_confidence: f64,
    /// Stop distance beyond the edge, in ticks
    pub stop_ticks: f64,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            proximity_ticks: 6.0,
            min_confidence: 0.55,
            stop_ticks: 6.0,
        }
    }
}

/// Per-detector thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub gamma_pin_reversion: WallDetectorConfig,
    pub dealer_flip_breakout: BaseDetectorConfig,
    pub liquidity_sweep_reversal: SweepConfig,
    pub stacked_imbalance_continuation: ImbalanceConfig,
    pub iceberg_tracker_follow: IcebergConfig,
    pub cvd_divergence_trap: BaseDetectorConfig,
    pub opening_drive_fail: OpeningDriveConfig,
    pub es_nq_lead_lag_mirror: LeadLagConfig,
    pub vwap_band_squeeze_break: SqueezeConfig,
    pub profile_gap_fill: BaseDetectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseDetectorConfig {
    pub confidence: f64,
}

impl Default for BaseDetectorConfig {
    fn default() -> Self {
        Self { confidence: 0.66 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallDetectorConfig {
    pub confidence: f64,
    pub max_wall_dist_ticks: f64,
}

impl Default for WallDetectorConfig {
    fn default() -> Self {
        Self {
            confidence: 0.62,
            max_wall_dist_ticks: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub confidence: f64,
    pub min_wick_ticks: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            confidence: 0.64,
            min_wick_ticks: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImbalanceConfig {
    pub confidence: f64,
    pub min_rows: u32,
}

impl Default for ImbalanceConfig {
    fn default() -> Self {
        Self {
            confidence: 0.64,
            min_rows: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcebergConfig {
    pub confidence: f64,
    pub max_dist_ticks: f64,
}

impl Default for IcebergConfig {
    fn default() -> Self {
        Self {
            confidence: 0.63,
            max_dist_ticks: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeningDriveConfig {
    pub confidence: f64,
    pub max_wall_dist_ticks: f64,
}

impl Default for OpeningDriveConfig {
    fn default() -> Self {
        Self {
            confidence: 0.64,
            max_wall_dist_ticks: 24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadLagConfig {
    pub confidence: f64,
    /// Correlation at or below which the pair counts as decoupled
    pub max_correlation: f64,
    /// Added when the evaluated symbol is the leader
    pub leader_bonus: f64,
}

impl Default for LeadLagConfig {
    fn default() -> Self {
        Self {
            confidence: 0.62,
            max_correlation: 0.5,
            leader_bonus: 0.04,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqueezeConfig {
    pub confidence: f64,
    /// Widest SD1 band (upper minus lower, ticks) counted as a squeeze
    pub max_band_width_ticks: f64,
}

impl Default for SqueezeConfig {
    fn default() -> Self {
        Self {
            confidence: 0.66,
            max_band_width_ticks: 8.0,
        }
    }
}

/// General engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Wall-clock budget for one tick in milliseconds
    #[serde(default = "default_tick_budget_ms")]
    pub tick_budget_ms: u64,
    /// Ticks kept for latency statistics
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_budget_ms: default_tick_budget_ms(),
            latency_window: default_latency_window(),
            log_level: default_log_level(),
        }
    }
}

fn default_tick_budget_ms() -> u64 {
    50
}

fn default_latency_window() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}
