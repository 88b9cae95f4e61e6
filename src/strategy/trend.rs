//! Trend-following strategy for trending regimes

use serde_json::json;

use crate::common::errors::DetectorError;
use crate::config::types::TrendConfig;
use crate::features::FeatureName;
use crate::strategy::context::PatternContext;
use crate::strategy::traits::RegimeStrategy;
use crate::strategy::types::{CandidateKind, CandidateSignal};

pub struct TrendStrategy {
    config: TrendConfig,
}

impl TrendStrategy {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }
}

impl RegimeStrategy for TrendStrategy {
    fn name(&self) -> &str {
        "trend_following"
    }

    fn kind(&self) -> CandidateKind {
        CandidateKind::Trend
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let regime = &ctx.regime;
        let Some(side) = regime.bias.locked_side().filter(|_| regime.regime.is_trend()) else {
            return Ok(None);
        };

        // Only join the trend from its own side of VWAP
        if let Some(vwap_side) = ctx.side_vs_vwap() {
            if vwap_side != side {
                return Ok(None);
            }
        }

        let pullback = ctx.feature(FeatureName::PullbackQuality);
        let volume = ctx.feature(FeatureName::VolumeConfirmation);
        let confidence = (0.45 * regime.trend_strength + 0.25 * pullback + 0.30 * volume).min(1.0);
        if confidence < self.config.min_confidence {
            return Ok(None);
        }

        let stop = ctx.price - side.sign() * ctx.atr * self.config.stop_atr_multiple;
        let signal = CandidateSignal::new(
            self.name(),
            CandidateKind::Trend,
            side,
            confidence,
            format!("{} trend, strength {:.2}", regime.regime, regime.trend_strength),
        )
        .with_bracket(ctx.price, stop, self.config.reward_risk, ctx.tick_size)
        .with_diagnostics(json!({
            "trend_strength": regime.trend_strength,
            "pullback_quality": pullback,
            "volume_confirmation": volume,
            "atr": ctx.atr,
        }));
        Ok(Some(signal))
    }
}
