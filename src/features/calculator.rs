use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

use super::cache::{CacheKey, CacheStats, FeatureCache};
use super::confluence::{confluence_score, FeatureWeights, QualityTier};
use super::names::FeatureName;
use crate::common::errors::{isolate, FeatureError};
use crate::common::math::{clamp01, linear_slope, mean, pearson};
use crate::common::types::{to_f64, Bar, LevelKind, MarketContext};
use crate::config::types::{EngineConfig, FeatureConfig, QualityConfig, RegimeConfig};
use crate::regime::structure::{structure_counts, Series};

/// Feature values for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureResult {
    /// Every feature, clamped to [0, 1]; degraded ones hold their neutral value
    pub values: BTreeMap<FeatureName, f64>,
    pub degraded: Vec<FeatureName>,
    pub confluence_score: f64,
    pub tier: QualityTier,
    pub size_multiplier: f64,
    pub elapsed_micros: u64,
}

impl FeatureResult {
    /// Assemble a result from raw values, scoring it with `weights`
    pub fn from_values(
        values: BTreeMap<FeatureName, f64>,
        degraded: Vec<FeatureName>,
        weights: &FeatureWeights,
        quality: &QualityConfig,
    ) -> Self {
        let values: BTreeMap<_, _> = FeatureName::ALL
            .iter()
            .map(|name| {
                let value = values.get(name).copied().unwrap_or_else(|| name.neutral());
                (*name, clamp01(value))
            })
            .collect();
        let confluence = confluence_score(weights, &values);
        let tier = quality.thresholds.tier_for(confluence);
        Self {
            values,
            degraded,
            confluence_score: confluence,
            tier,
            size_multiplier: quality.multipliers.for_tier(tier),
            elapsed_micros: 0,
        }
    }

    pub fn value(&self, name: FeatureName) -> f64 {
        self.values
            .get(&name)
            .copied()
            .unwrap_or_else(|| name.neutral())
    }

    pub fn is_degraded(&self, name: FeatureName) -> bool {
        self.degraded.contains(&name)
    }
}

/// Source of per-tick feature values
pub trait FeatureSource: Send + Sync {
    fn compute(&self, ctx: &MarketContext) -> FeatureResult;

    /// Memo counters, for sources that cache
    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Computes the ten confluence features from a snapshot
pub struct FeatureCalculator {
    config: FeatureConfig,
    quality: QualityConfig,
    regime: RegimeConfig,
    cache: FeatureCache,
}

impl FeatureCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.features.clone(),
            quality: config.quality.clone(),
            regime: config.regime.clone(),
            cache: FeatureCache::new(&config.features.cache),
        }
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    /// Compute a single feature without isolation or clamping
    pub fn compute_feature(
        &self,
        name: FeatureName,
        ctx: &MarketContext,
    ) -> Result<f64, FeatureError> {
        match name {
            FeatureName::TrendSlope => self.trend_slope(ctx),
            FeatureName::PatternStrength => self.pattern_strength(ctx),
            FeatureName::RegimeStructure => self.regime_structure(ctx),
            FeatureName::GammaProximity => self.gamma_proximity(ctx),
            FeatureName::LevelProximity => self.level_proximity(ctx),
            FeatureName::CrossSymbolCorrelation => cross_symbol_correlation(ctx),
            FeatureName::VolumeConfirmation => self.volume_confirmation(ctx),
            FeatureName::OptionsFlowBias => options_flow_bias(ctx),
            FeatureName::SessionContext => Ok(ctx.session_phase().performance()),
            FeatureName::PullbackQuality => self.pullback_quality(ctx),
        }
    }

    fn trend_slope(&self, ctx: &MarketContext) -> Result<f64, FeatureError> {
        let periods = self.config.slope_periods.max(2);
        require_bars(ctx, periods)?;
        let tick = ctx.tick();
        let closes: Vec<f64> = ctx
            .recent_bars(periods)
            .iter()
            .map(|b| to_f64(b.close))
            .collect();

        let slope = linear_slope(&closes).unwrap_or(0.0) / tick;
        let slope_score = (slope.abs() / self.regime.slope_normalizer).min(1.0);

        let consistency = if slope == 0.0 {
            0.5
        } else {
            let agreeing = closes
                .windows(2)
                .filter(|w| (w[1] - w[0]) * slope > 0.0)
                .count();
            agreeing as f64 / (closes.len() - 1) as f64
        };

        // Price on the trend side of VWAP, scaled by the SD1 band
        let position = match (
            ctx.level(LevelKind::Vwap),
            ctx.level(LevelKind::VwapSd1Upper),
        ) {
            (Some(vwap), Some(upper)) if upper > vwap && slope != 0.0 => {
                let band = to_f64(upper - vwap);
                let offset = to_f64(ctx.price() - vwap) * slope.signum();
                clamp01(0.5 + 0.5 * offset / band)
            }
            _ => 0.5,
        };

        finite(0.40 * slope_score + 0.35 * consistency + 0.25 * position)
    }

    fn pattern_strength(&self, ctx: &MarketContext) -> Result<f64, FeatureError> {
        let previous = ctx.history.last();
        let avg_range = mean(
            &ctx.history
                .iter()
                .rev()
                .take(self.config.lookback)
                .map(|b| to_f64(b.range()))
                .collect::<Vec<_>>(),
        );

        let key = ohlc_key(CacheKey::builder(FeatureName::PatternStrength), &ctx.bar);
        let key = match previous {
            Some(prev) => ohlc_key(key.flag(true), prev),
            None => key.flag(false),
        }
        .opt_f64(avg_range)
        .build();

        self.cache.get_or_compute(key, ctx.timestamp, || {
            finite(bar_pattern_strength(&ctx.bar, previous, avg_range))
        })
    }

    fn regime_structure(&self, ctx: &MarketContext) -> Result<f64, FeatureError> {
        require_bars(ctx, self.regime.min_bars)?;
        let series = Series::from_bars(ctx.recent_bars(self.regime.structure_window));
        finite(structure_counts(&series, self.regime.pivot_wing).score())
    }

    fn gamma_proximity(&self, ctx: &MarketContext) -> Result<f64, FeatureError> {
        let call = ctx.level(LevelKind::CallWall).map(to_f64);
        let put = ctx.level(LevelKind::PutWall).map(to_f64);
        let trigger = ctx.level(LevelKind::VolTrigger).map(to_f64);
        let flip = ctx.level(LevelKind::GammaFlip).map(to_f64);
        let options = ctx.options.as_ref();

        if call.is_none() && put.is_none() && trigger.is_none() && options.is_none() {
            return Err(FeatureError::MissingInput("gamma levels"));
        }

        let price = to_f64(ctx.price());
        let span = self.config.gamma_span_ticks * ctx.tick();
        let key = CacheKey::builder(FeatureName::GammaProximity)
            .f64(price)
            .f64(span)
            .opt_f64(call)
            .opt_f64(put)
            .opt_f64(trigger)
            .opt_f64(flip)
            .opt_f64(options.map(|o| o.net_gamma))
            .flag(options.map(|o| o.gamma_flip_active).unwrap_or(false))
            .build();

        self.cache.get_or_compute(key, ctx.timestamp, || {
            let proximity =
                |level: Option<f64>| level.map_or(0.0, |l| (1.0 - (price - l).abs() / span).max(0.0));
            let net_gamma = options.map_or(0.0, |o| (o.net_gamma.abs() / 0.1).min(1.0));
            let flip_bonus = if options.map(|o| o.gamma_flip_active).unwrap_or(false) {
                0.05
            } else {
                0.05 * proximity(flip)
            };
            finite(
                0.325 * proximity(call)
                    + 0.325 * proximity(put)
                    + 0.10 * proximity(trigger)
                    + 0.25 * net_gamma
                    + flip_bonus,
            )
        })
    }

    fn level_proximity(&self, ctx: &MarketContext) -> Result<f64, FeatureError> {
        let price = ctx.price();
        let nearest = [
            LevelKind::PointOfControl,
            LevelKind::ValueAreaHigh,
            LevelKind::ValueAreaLow,
            LevelKind::PreviousHigh,
            LevelKind::PreviousLow,
        ]
        .iter()
        .filter_map(|kind| ctx.level(*kind))
        .chain(ctx.levels.blind_spots.iter().copied())
        .map(|level| (price - level).abs())
        .min()
        .ok_or(FeatureError::MissingInput("profile levels"))?;

        let span = self.config.level_span_ticks * ctx.tick();
        finite((1.0 - to_f64(nearest) / span).max(0.0))
    }

    fn volume_confirmation(&self, ctx: &MarketContext) -> Result<f64, FeatureError> {
        let lookback = self.config.lookback.max(1);
        require_bars(ctx, lookback + 1)?;

        let previous: Vec<f64> = ctx
            .history
            .iter()
            .rev()
            .take(lookback)
            .map(|b| to_f64(b.volume))
            .collect();
        let current = to_f64(ctx.bar.volume);
        let relative = match mean(&previous) {
            Some(avg) if avg > 0.0 => (current / avg / 1.8).min(1.0),
            _ => 0.5,
        };

        let flow = &ctx.order_flow;
        let aggressive = to_f64(flow.aggressive_volume());
        let delta = if aggressive > 0.0 {
            (to_f64(flow.net_delta()).abs() / aggressive * 2.2).min(1.0)
        } else {
            0.0
        };
        let aggressive_share = if current > 0.0 {
            (aggressive / current).min(1.0)
        } else {
            0.0
        };

        let recent = ctx.recent_bars(5);
        let volumes: Vec<f64> = recent.iter().map(|b| to_f64(b.volume)).collect();
        let closes: Vec<f64> = recent.iter().map(|b| to_f64(b.close)).collect();
        let agreement = pearson(&volumes, &closes).map_or(0.5, |r| (r.abs() + 1.0) / 2.0);

        finite(0.45 * relative + 0.25 * delta + 0.10 * aggressive_share + 0.20 * agreement)
    }

    fn pullback_quality(&self, ctx: &MarketContext) -> Result<f64, FeatureError> {
        let lookback = self.config.lookback.max(2);
        require_bars(ctx, lookback)?;
        let bars = ctx.recent_bars(lookback);
        let high = bars.iter().map(|b| b.high).max().unwrap_or(Decimal::ZERO);
        let low = bars.iter().map(|b| b.low).min().unwrap_or(Decimal::ZERO);
        if high <= low {
            return Ok(0.5);
        }
        let position = to_f64(ctx.price() - low) / to_f64(high - low);
        let quality = if (0.3..=0.7).contains(&position) {
            0.7
        } else if (0.2..=0.8).contains(&position) {
            0.6
        } else {
            0.4
        };
        Ok(quality)
    }
}

impl FeatureSource for FeatureCalculator {
    fn compute(&self, ctx: &MarketContext) -> FeatureResult {
        let started = Instant::now();
        let mut values = BTreeMap::new();
        let mut degraded = Vec::new();

        for name in FeatureName::ALL {
            let outcome = isolate(|| self.compute_feature(name, ctx))
                .unwrap_or_else(|msg| Err(FeatureError::Panicked(msg)))
                .and_then(finite);
            match outcome {
                Ok(value) => {
                    values.insert(name, clamp01(value));
                }
                Err(e) => {
                    warn!(
                        feature = %name,
                        symbol = %ctx.symbol,
                        price = %ctx.price(),
                        bars = ctx.bar_count(),
                        error = %e,
                        "feature degraded to neutral"
                    );
                    values.insert(name, name.neutral());
                    degraded.push(name);
                }
            }
        }

        let mut result =
            FeatureResult::from_values(values, degraded, &self.config.weights, &self.quality);
        result.elapsed_micros = started.elapsed().as_micros() as u64;
        debug!(
            symbol = %ctx.symbol,
            confluence = result.confluence_score,
            tier = %result.tier,
            degraded = result.degraded.len(),
            micros = result.elapsed_micros,
            "features computed"
        );
        result
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn finite(value: f64) -> Result<f64, FeatureError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FeatureError::NonFinite)
    }
}

fn require_bars(ctx: &MarketContext, needed: usize) -> Result<(), FeatureError> {
    let available = ctx.bar_count();
    if available < needed {
        Err(FeatureError::InsufficientHistory { needed, available })
    } else {
        Ok(())
    }
}

fn ohlc_key(
    builder: super::cache::CacheKeyBuilder,
    bar: &Bar,
) -> super::cache::CacheKeyBuilder {
    builder
        .f64(to_f64(bar.open))
        .f64(to_f64(bar.high))
        .f64(to_f64(bar.low))
        .f64(to_f64(bar.close))
}

/// Candle quality of `bar` given the previous bar and the recent mean range
pub fn bar_pattern_strength(bar: &Bar, previous: Option<&Bar>, avg_range: Option<f64>) -> f64 {
    let range = to_f64(bar.range());
    if range <= 0.0 {
        return 0.0;
    }
    let open = to_f64(bar.open);
    let close = to_f64(bar.close);
    let body = (close - open).abs() / range;
    let close_location = (close - to_f64(bar.low)) / range;
    let directional = body * (2.0 * close_location - 1.0).abs();

    let engulfing = previous.map_or(0.0, |prev| {
        let prev_open = to_f64(prev.open);
        let prev_close = to_f64(prev.close);
        let opposite = (close - open) * (prev_close - prev_open) < 0.0;
        let covers = open.max(close) >= prev_open.max(prev_close)
            && open.min(close) <= prev_open.min(prev_close);
        if opposite && covers {
            1.0
        } else {
            0.0
        }
    });

    let rejection = if body < 0.35 {
        to_f64(bar.max_wick()) / range
    } else {
        0.0
    };

    let expansion = match avg_range {
        Some(avg) if avg > 0.0 => (range / avg / 2.0).min(1.0),
        _ => 0.5,
    };

    0.40 * directional + 0.25 * engulfing + 0.20 * rejection + 0.15 * expansion
}

fn cross_symbol_correlation(ctx: &MarketContext) -> Result<f64, FeatureError> {
    let cross = ctx
        .cross_symbol
        .as_ref()
        .ok_or(FeatureError::MissingInput("cross-symbol snapshot"))?;
    let correlation = finite(cross.correlation)?;
    let divergence = finite(cross.divergence)?;
    Ok(0.7 * correlation.max(0.0) + 0.3 * (1.0 - divergence.abs()).max(0.0))
}

fn options_flow_bias(ctx: &MarketContext) -> Result<f64, FeatureError> {
    let options = ctx
        .options
        .as_ref()
        .ok_or(FeatureError::MissingInput("options snapshot"))?;
    let price = to_f64(ctx.price());

    let pcr_bias = clamp01(0.5 - (options.put_call_ratio - 1.0));
    let total = options.call_volume + options.put_volume;
    let call_share = if total > 0.0 {
        options.call_volume / total
    } else {
        0.5
    };
    let walls_bias = match (
        ctx.level(LevelKind::CallWall).map(to_f64),
        ctx.level(LevelKind::PutWall).map(to_f64),
    ) {
        (Some(call), Some(put)) if call > put => 1.0 - clamp01((price - put) / (call - put)),
        _ => 0.5,
    };
    let trigger_bias = match ctx.level(LevelKind::VolTrigger).map(to_f64) {
        Some(trigger) if price >= trigger => 0.7,
        Some(_) => 0.3,
        None => 0.5,
    };

    let raw = (0.40 * pcr_bias + 0.30 * call_share + 0.20 * walls_bias + 0.05 * trigger_bias) / 0.95;
    finite((raw - 0.5).abs() * 2.0)
}
