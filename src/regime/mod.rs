//! Market regime classification
//!
//! The detector is a pure function of the snapshot and its features. When the
//! evidence is ambiguous it resolves to the more conservative regime: a tie in
//! structure never yields a trend, and anything that is neither trend nor
//! range forbids trading.

pub mod structure;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::types::{MarketContext, Side};
use crate::config::types::RegimeConfig;
use crate::features::{FeatureName, FeatureResult};
use structure::{
    detect_range, momentum_ticks, slope_ticks, structure_counts, RangeLevels, Series,
    StructureCounts,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    StrongTrendBullish,
    StrongTrendBearish,
    WeakTrendBullish,
    WeakTrendBearish,
    RangeBullishBias,
    RangeBearishBias,
    RangeNeutral,
    Transition,
    Unclear,
}

impl Regime {
    pub fn strong_trend(side: Side) -> Self {
        match side {
            Side::Long => Regime::StrongTrendBullish,
            Side::Short => Regime::StrongTrendBearish,
        }
    }

    pub fn weak_trend(side: Side) -> Self {
        match side {
            Side::Long => Regime::WeakTrendBullish,
            Side::Short => Regime::WeakTrendBearish,
        }
    }

    pub fn biased_range(side: Side) -> Self {
        match side {
            Side::Long => Regime::RangeBullishBias,
            Side::Short => Regime::RangeBearishBias,
        }
    }

    pub fn is_trend(self) -> bool {
        self.is_strong_trend()
            || matches!(self, Regime::WeakTrendBullish | Regime::WeakTrendBearish)
    }

    pub fn is_strong_trend(self) -> bool {
        matches!(self, Regime::StrongTrendBullish | Regime::StrongTrendBearish)
    }

    pub fn is_range(self) -> bool {
        matches!(
            self,
            Regime::RangeBullishBias | Regime::RangeBearishBias | Regime::RangeNeutral
        )
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Regime::StrongTrendBullish => "strong_trend_bullish",
            Regime::StrongTrendBearish => "strong_trend_bearish",
            Regime::WeakTrendBullish => "weak_trend_bullish",
            Regime::WeakTrendBearish => "weak_trend_bearish",
            Regime::RangeBullishBias => "range_bullish_bias",
            Regime::RangeBearishBias => "range_bearish_bias",
            Regime::RangeNeutral => "range_neutral",
            Regime::Transition => "transition",
            Regime::Unclear => "unclear",
        };
        f.write_str(name)
    }
}

/// Which sides may be traded this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionalBias {
    BullishOnly,
    BearishOnly,
    Unrestricted,
    Forbidden,
}

impl DirectionalBias {
    pub fn locked_to(side: Side) -> Self {
        match side {
            Side::Long => DirectionalBias::BullishOnly,
            Side::Short => DirectionalBias::BearishOnly,
        }
    }

    /// The side a locked bias points to
    pub fn locked_side(self) -> Option<Side> {
        match self {
            DirectionalBias::BullishOnly => Some(Side::Long),
            DirectionalBias::BearishOnly => Some(Side::Short),
            _ => None,
        }
    }

    pub fn allows(self, side: Side) -> bool {
        match self {
            DirectionalBias::Forbidden => false,
            DirectionalBias::Unrestricted => true,
            locked => locked.locked_side() == Some(side),
        }
    }
}

impl std::fmt::Display for DirectionalBias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DirectionalBias::BullishOnly => "bullish_only",
            DirectionalBias::BearishOnly => "bearish_only",
            DirectionalBias::Unrestricted => "unrestricted",
            DirectionalBias::Forbidden => "forbidden",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeResult {
    pub regime: Regime,
    pub bias: DirectionalBias,
    /// Blend of structure, slope and momentum in [0, 1]
    pub trend_strength: f64,
    pub confidence: f64,
    pub structure: StructureCounts,
    /// Close regression slope, ticks per bar
    pub slope_ticks: f64,
    pub range: Option<RangeLevels>,
}

impl RegimeResult {
    /// No usable structure: trading forbidden
    pub fn unclear() -> Self {
        Self {
            regime: Regime::Unclear,
            bias: DirectionalBias::Forbidden,
            trend_strength: 0.0,
            confidence: 0.0,
            structure: StructureCounts::default(),
            slope_ticks: 0.0,
            range: None,
        }
    }

    pub fn new(regime: Regime, bias: DirectionalBias) -> Self {
        Self {
            regime,
            bias,
            ..Self::unclear()
        }
    }

    pub fn with_trend_strength(mut self, strength: f64) -> Self {
        self.trend_strength = strength;
        self.confidence = strength;
        self
    }
}

/// Classifies the market from a snapshot and its features
pub trait RegimeClassifier: Send + Sync {
    fn classify(&self, ctx: &MarketContext, features: &FeatureResult) -> RegimeResult;
}

/// Structure-based regime detector
pub struct MarketRegimeDetector {
    config: RegimeConfig,
}

impl MarketRegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    fn trend_strength(&self, structure: f64, slope: f64, momentum: f64, features: &FeatureResult) -> f64 {
        let slope_score = (slope.abs() / self.config.slope_normalizer).min(1.0);
        let momentum_score = (momentum.abs() / (self.config.slope_normalizer * 5.0)).min(1.0);
        let raw = 0.40 * structure + 0.35 * slope_score + 0.25 * momentum_score;

        let trend_features = [FeatureName::TrendSlope, FeatureName::RegimeStructure];
        if trend_features.iter().any(|f| features.is_degraded(*f)) {
            raw
        } else {
            let support = trend_features.iter().map(|f| features.value(*f)).sum::<f64>() / 2.0;
            0.8 * raw + 0.2 * support
        }
    }

    /// Trend direction over the full history, if structure and slope agree
    fn higher_timeframe_trend(&self, ctx: &MarketContext) -> Option<Side> {
        let series = Series::from_bars(ctx.bars());
        let slope = slope_ticks(&series, ctx.tick());
        if slope.abs() < self.config.htf_min_slope_ticks {
            return None;
        }
        let side = if slope > 0.0 { Side::Long } else { Side::Short };
        let counts = structure_counts(&series, self.config.pivot_wing);
        match counts.dominant() {
            Some(dominant) if dominant == side => Some(side),
            None if counts.total() == 0 => Some(side),
            _ => None,
        }
    }
}

impl Default for MarketRegimeDetector {
    fn default() -> Self {
        Self::new(RegimeConfig::default())
    }
}

impl RegimeClassifier for MarketRegimeDetector {
    fn classify(&self, ctx: &MarketContext, features: &FeatureResult) -> RegimeResult {
        let cfg = &self.config;
        if ctx.bar_count() < cfg.min_bars {
            debug!(symbol = %ctx.symbol, bars = ctx.bar_count(), "regime unclear: not enough bars");
            return RegimeResult::unclear();
        }

        let tick = ctx.tick();
        let series = Series::from_bars(ctx.recent_bars(cfg.structure_window));
        let counts = structure_counts(&series, cfg.pivot_wing);
        let slope = slope_ticks(&series, tick);
        let momentum = momentum_ticks(&series, tick);
        let strength = self.trend_strength(counts.score(), slope, momentum, features);

        let slope_side = if slope > 0.0 {
            Some(Side::Long)
        } else if slope < 0.0 {
            Some(Side::Short)
        } else {
            None
        };
        let dominant = counts.dominant();
        let agrees = dominant.is_some() && dominant == slope_side;

        let mut result = RegimeResult {
            structure: counts,
            slope_ticks: slope,
            ..RegimeResult::unclear()
        }
        .with_trend_strength(strength);

        if let (true, Some(side)) = (agrees, dominant) {
            let dominant_count = counts.dominant_count();
            if strength >= cfg.strong_trend_threshold
                && dominant_count >= 4
                && slope.abs() >= cfg.strong_min_slope_ticks
            {
                result.regime = Regime::strong_trend(side);
                result.bias = DirectionalBias::locked_to(side);
            } else if strength >= cfg.weak_trend_threshold
                && dominant_count >= 2
                && slope.abs() >= cfg.weak_min_slope_ticks
            {
                result.regime = Regime::weak_trend(side);
                result.bias = DirectionalBias::locked_to(side);
            }
        }

        if !result.regime.is_trend() {
            if let Some(range) = detect_range(&series, tick, cfg) {
                result.confidence = range.respect_rate;
                match self.higher_timeframe_trend(ctx) {
                    Some(side) => {
                        result.regime = Regime::biased_range(side);
                        result.bias = DirectionalBias::locked_to(side);
                    }
                    None => {
                        result.regime = Regime::RangeNeutral;
                        result.bias = DirectionalBias::Unrestricted;
                    }
                }
                result.range = Some(range);
            } else {
                let conflicting = (counts.bullish() >= 2
                    && counts.bearish() >= 2
                    && counts.bullish().abs_diff(counts.bearish()) <= 1)
                    || (dominant.is_some() && slope_side.is_some() && !agrees);
                result.regime = if conflicting {
                    Regime::Transition
                } else {
                    Regime::Unclear
                };
                result.bias = DirectionalBias::Forbidden;
                result.confidence = 1.0 - strength;
            }
        }

        debug!(
            symbol = %ctx.symbol,
            regime = %result.regime,
            bias = %result.bias,
            strength = result.trend_strength,
            slope = result.slope_ticks,
            bullish = counts.bullish(),
            bearish = counts.bearish(),
            "regime classified"
        );
        result
    }
}
