//! Range-edge fading strategy for range regimes

use serde_json::json;

use crate::common::errors::DetectorError;
use crate::common::types::Side;
use crate::config::types::RangeConfig;
use crate::features::FeatureName;
use crate::strategy::context::PatternContext;
use crate::strategy::traits::RegimeStrategy;
use crate::strategy::types::{round_to_tick, CandidateKind, CandidateSignal};

pub struct RangeStrategy {
    config: RangeConfig,
}

impl RangeStrategy {
    pub fn new(config: RangeConfig) -> Self {
        Self { config }
    }

    /// Value-area edges when supplied, otherwise the detected range
    fn edges(ctx: &PatternContext) -> Option<(f64, f64)> {
        match (ctx.value_area.val, ctx.value_area.vah) {
            (Some(val), Some(vah)) if vah > val => Some((val, vah)),
            _ => ctx
                .regime
                .range
                .as_ref()
                .map(|r| (r.support, r.resistance)),
        }
    }
}

impl RegimeStrategy for RangeStrategy {
    fn name(&self) -> &str {
        "range_fade"
    }

    fn kind(&self) -> CandidateKind {
        CandidateKind::Range
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        if !ctx.regime.regime.is_range() {
            return Ok(None);
        }
        let Some((support, resistance)) = Self::edges(ctx) else {
            return Ok(None);
        };

        let from_support = ctx.ticks_from(support);
        let from_resistance = ctx.ticks_from(resistance);
        let (side, edge, distance) = if from_support <= from_resistance {
            (Side::Long, support, from_support)
        } else {
            (Side::Short, resistance, from_resistance)
        };
        if distance > self.config.proximity_ticks {
            return Ok(None);
        }

        let closeness = 1.0 - distance / self.config.proximity_ticks;
        let level_proximity = ctx.feature(FeatureName::LevelProximity);
        let confidence = 0.5 + 0.3 * closeness + 0.2 * level_proximity;
        if confidence < self.config.min_confidence {
            return Ok(None);
        }

        let tick = ctx.tick_size;
        let stop = edge - side.sign() * self.config.stop_ticks * tick;
        let midpoint = (support + resistance) / 2.0;
        let far_edge = if side == Side::Long { resistance } else { support };

        let signal = CandidateSignal::new(
            self.name(),
            CandidateKind::Range,
            side,
            confidence,
            format!("fade range edge at {:.2}", edge),
        )
        .with_entry(round_to_tick(ctx.price, tick))
        .with_stop(round_to_tick(stop, tick))
        .with_target(round_to_tick(midpoint, tick))
        .with_target(round_to_tick(far_edge, tick))
        .with_diagnostics(json!({
            "support": support,
            "resistance": resistance,
            "edge_distance_ticks": distance,
        }));
        Ok(Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::{DirectionalBias, Regime, RegimeResult};
    use crate::strategy::test_support::pattern_context;
    use rust_decimal_macros::dec;

    fn range_context(price: f64) -> PatternContext {
        let mut ctx = pattern_context(
            price,
            RegimeResult::new(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        );
        ctx.value_area.val = Some(4995.0);
        ctx.value_area.vah = Some(5005.0);
        ctx
    }

    #[test]
    fn test_long_at_support() {
        let signal = RangeStrategy::new(RangeConfig::default())
            .evaluate(&range_context(4995.0))
            .unwrap()
            .unwrap();
        assert_eq!(signal.side, Side::Long);
        assert!((signal.confidence - 0.8).abs() < 1e-9);
        assert_eq!(signal.stop, Some(dec!(4993.5)));
        assert_eq!(signal.targets, vec![dec!(5000), dec!(5005)]);
    }

    #[test]
    fn test_short_near_resistance() {
        let signal = RangeStrategy::new(RangeConfig::default())
            .evaluate(&range_context(5004.5))
            .unwrap()
            .unwrap();
        assert_eq!(signal.side, Side::Short);
    }

    #[test]
    fn test_mid_range_is_silent() {
        let signal = RangeStrategy::new(RangeConfig::default())
            .evaluate(&range_context(5000.0))
            .unwrap();
        assert!(signal.is_none());
    }
}
