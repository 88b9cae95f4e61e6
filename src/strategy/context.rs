use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::common::math::mean;
use crate::common::types::{
    to_f64, CrossSymbolSnapshot, LevelKind, MarketContext, OrderFlow, SessionPhase, Side,
    VolatilitySnapshot,
};
use crate::features::{FeatureName, FeatureResult};
use crate::regime::RegimeResult;

const ATR_PERIODS: usize = 14;
const MIN_ATR_TICKS: f64 = 2.0;
const DEFAULT_ATR_TICKS: f64 = 4.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VwapBands {
    pub vwap: f64,
    pub sd1_upper: Option<f64>,
    pub sd1_lower: Option<f64>,
    pub sd2_upper: Option<f64>,
    pub sd2_lower: Option<f64>,
}

impl VwapBands {
    /// Upper minus lower SD1 band
    pub fn sd1_width(&self) -> Option<f64> {
        Some(self.sd1_upper? - self.sd1_lower?)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueArea {
    pub poc: Option<f64>,
    pub vah: Option<f64>,
    pub val: Option<f64>,
    /// Low-volume node as (low, high)
    pub lvn: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallKind {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallProximity {
    pub kind: WallKind,
    pub price: f64,
    pub distance_ticks: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GammaLevels {
    pub call_wall: Option<f64>,
    pub put_wall: Option<f64>,
    pub gamma_flip: Option<f64>,
    pub vol_trigger: Option<f64>,
    pub flip_active: bool,
    pub net_gamma: Option<f64>,
}

/// Read-only view shared by every detector in a tick
#[derive(Debug, Clone, PartialEq)]
pub struct PatternContext {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub tick_size: f64,
    /// Average true range in price units
    pub atr: f64,
    pub vwap: Option<VwapBands>,
    pub value_area: ValueArea,
    pub gamma: GammaLevels,
    pub order_flow: OrderFlow,
    pub cross_symbol: Option<CrossSymbolSnapshot>,
    pub volatility: Option<VolatilitySnapshot>,
    pub session: SessionPhase,
    pub last_wick_ticks: f64,
    pub regime: RegimeResult,
    pub features: BTreeMap<FeatureName, f64>,
    pub confluence_score: f64,
}

impl PatternContext {
    pub fn build(ctx: &MarketContext, features: &FeatureResult, regime: &RegimeResult) -> Self {
        let level = |kind| ctx.level(kind).map(to_f64);
        let vwap = level(LevelKind::Vwap).map(|vwap| VwapBands {
            vwap,
            sd1_upper: level(LevelKind::VwapSd1Upper),
            sd1_lower: level(LevelKind::VwapSd1Lower),
            sd2_upper: level(LevelKind::VwapSd2Upper),
            sd2_lower: level(LevelKind::VwapSd2Lower),
        });
        let lvn = match (
            level(LevelKind::LowVolumeNodeLow),
            level(LevelKind::LowVolumeNodeHigh),
        ) {
            (Some(low), Some(high)) if high > low => Some((low, high)),
            _ => None,
        };

        Self {
            symbol: ctx.symbol.clone(),
            timestamp: ctx.timestamp,
            price: to_f64(ctx.price()),
            tick_size: ctx.tick(),
            atr: average_true_range(ctx),
            vwap,
            value_area: ValueArea {
                poc: level(LevelKind::PointOfControl),
                vah: level(LevelKind::ValueAreaHigh),
                val: level(LevelKind::ValueAreaLow),
                lvn,
            },
            gamma: GammaLevels {
                call_wall: level(LevelKind::CallWall),
                put_wall: level(LevelKind::PutWall),
                gamma_flip: level(LevelKind::GammaFlip),
                vol_trigger: level(LevelKind::VolTrigger),
                flip_active: ctx.options.as_ref().map_or(false, |o| o.gamma_flip_active),
                net_gamma: ctx.options.as_ref().map(|o| o.net_gamma),
            },
            order_flow: ctx.order_flow.clone(),
            cross_symbol: ctx.cross_symbol.clone(),
            volatility: ctx.volatility.clone(),
            session: ctx.session_phase(),
            last_wick_ticks: ctx.last_wick_ticks(),
            regime: regime.clone(),
            features: features.values.clone(),
            confluence_score: features.confluence_score,
        }
    }

    pub fn ticks_from(&self, level: f64) -> f64 {
        (self.price - level).abs() / self.tick_size
    }

    pub fn feature(&self, name: FeatureName) -> f64 {
        self.features
            .get(&name)
            .copied()
            .unwrap_or_else(|| name.neutral())
    }

    /// Long above VWAP, short below, none when at VWAP or unknown
    pub fn side_vs_vwap(&self) -> Option<Side> {
        let vwap = self.vwap.as_ref()?.vwap;
        if self.price > vwap {
            Some(Side::Long)
        } else if self.price < vwap {
            Some(Side::Short)
        } else {
            None
        }
    }

    /// Closest call or put wall
    pub fn nearest_wall(&self) -> Option<WallProximity> {
        let call = self.gamma.call_wall.map(|price| WallProximity {
            kind: WallKind::Call,
            price,
            distance_ticks: self.ticks_from(price),
        });
        let put = self.gamma.put_wall.map(|price| WallProximity {
            kind: WallKind::Put,
            price,
            distance_ticks: self.ticks_from(price),
        });
        match (call, put) {
            (Some(c), Some(p)) => Some(if p.distance_ticks < c.distance_ticks { p } else { c }),
            (c, p) => c.or(p),
        }
    }

    /// Direction from price toward `level`
    pub fn side_toward(&self, level: f64) -> Option<Side> {
        if level > self.price {
            Some(Side::Long)
        } else if level < self.price {
            Some(Side::Short)
        } else {
            None
        }
    }
}

/// Mean true range over the last bars, floored at a couple of ticks
fn average_true_range(ctx: &MarketContext) -> f64 {
    let tick = ctx.tick();
    let bars = ctx.recent_bars(ATR_PERIODS + 1);
    if bars.len() < 2 {
        return DEFAULT_ATR_TICKS * tick;
    }
    let ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            let prev_close = to_f64(w[0].close);
            let high = to_f64(w[1].high);
            let low = to_f64(w[1].low);
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect();
    mean(&ranges)
        .unwrap_or(DEFAULT_ATR_TICKS * tick)
        .max(MIN_ATR_TICKS * tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Bar;
    use crate::config::types::QualityConfig;
    use crate::features::FeatureWeights;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn market() -> MarketContext {
        let ts = Utc.with_ymd_and_hms(2025, 3, 3, 15, 45, 0).unwrap();
        let bar = Bar::new(ts, dec!(5000), dec!(5001), dec!(4999.5), dec!(5000.5), dec!(800));
        MarketContext {
            symbol: "ES".to_string(),
            timestamp: ts,
            bar,
            history: vec![],
            tick_size: dec!(0.25),
            order_flow: Default::default(),
            levels: Default::default(),
            options: None,
            cross_symbol: None,
            volatility: None,
        }
    }

    fn build(ctx: &MarketContext) -> PatternContext {
        let features = FeatureResult::from_values(
            BTreeMap::new(),
            vec![],
            &FeatureWeights::default(),
            &QualityConfig::default(),
        );
        PatternContext::build(ctx, &features, &RegimeResult::unclear())
    }

    #[test]
    fn test_default_atr_without_history() {
        let pc = build(&market());
        assert_eq!(pc.atr, 1.0);
        assert_eq!(pc.session, SessionPhase::NyOpen);
    }

    #[test]
    fn test_nearest_wall_picks_closer() {
        let mut ctx = market();
        ctx.levels.set(LevelKind::CallWall, dec!(5002.0));
        ctx.levels.set(LevelKind::PutWall, dec!(4995.0));
        let wall = build(&ctx).nearest_wall().unwrap();
        assert_eq!(wall.kind, WallKind::Call);
        assert_eq!(wall.distance_ticks, 6.0);
    }

    #[test]
    fn test_side_vs_vwap() {
        let mut ctx = market();
        assert_eq!(build(&ctx).side_vs_vwap(), None);
        ctx.levels.set(LevelKind::Vwap, dec!(4999.0));
        assert_eq!(build(&ctx).side_vs_vwap(), Some(Side::Long));
    }
}
