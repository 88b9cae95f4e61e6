//! Cross-symbol detectors

use serde_json::json;

use crate::common::errors::DetectorError;
use crate::config::types::LeadLagConfig;
use crate::strategy::context::PatternContext;
use crate::strategy::traits::PatternDetector;
use crate::strategy::types::CandidateSignal;

/// ES/NQ decoupling with one side bursting; trade the mirror catch-up
pub struct EsNqLeadLagMirror {
    config: LeadLagConfig,
}

impl EsNqLeadLagMirror {
    pub fn new(config: LeadLagConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for EsNqLeadLagMirror {
    fn name(&self) -> &str {
        "es_nq_lead_lag_mirror"
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.cross_symbol.is_some()
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let Some(cross) = ctx.cross_symbol.as_ref() else {
            return Ok(None);
        };
        if !cross.correlation.is_finite() {
            return Err(DetectorError::InvalidContext(
                "cross-symbol correlation is not finite".to_string(),
            ));
        }
        if cross.correlation > self.config.max_correlation || !ctx.order_flow.delta_burst {
            return Ok(None);
        }
        let Some(side) = ctx.side_vs_vwap() else {
            return Ok(None);
        };

        let leading = cross.leader.as_deref() == Some(ctx.symbol.as_str());
        let confidence = if leading {
            self.config.confidence + self.config.leader_bonus
        } else {
            self.config.confidence
        };
        let stop = ctx.price - side.sign() * ctx.atr;

        let signal = CandidateSignal::pattern(
            side,
            confidence,
            format!("correlation {:.2}, {} bursting {}", cross.correlation, ctx.symbol, side),
        )
        .with_bracket(ctx.price, stop, 2.0, ctx.tick_size)
        .with_diagnostics(json!({
            "correlation": cross.correlation,
            "divergence": cross.divergence,
            "leader": cross.leader,
        }));
        Ok(Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{CrossSymbolSnapshot, Side};
    use crate::strategy::test_support::base_context;

    fn lead_lag_context(correlation: f64, leader: Option<&str>) -> PatternContext {
        let mut ctx = base_context(5000.0);
        ctx.order_flow.delta_burst = true;
        ctx.cross_symbol = Some(CrossSymbolSnapshot {
            correlation,
            divergence: 0.0,
            leader: leader.map(str::to_string),
        });
        ctx
    }

    #[test]
    fn test_mirror_with_leader_bonus() {
        let detector = EsNqLeadLagMirror::new(LeadLagConfig::default());
        let signal = detector
            .evaluate(&lead_lag_context(0.3, Some("ES")))
            .unwrap()
            .unwrap();
        assert_eq!(signal.side, Side::Long);
        assert!((signal.confidence - 0.66).abs() < 1e-9);

        let follower = detector
            .evaluate(&lead_lag_context(0.3, Some("NQ")))
            .unwrap()
            .unwrap();
        assert!((follower.confidence - 0.62).abs() < 1e-9);
    }

    #[test]
    fn test_correlated_markets_are_silent() {
        let detector = EsNqLeadLagMirror::new(LeadLagConfig::default());
        assert!(detector
            .evaluate(&lead_lag_context(0.9, None))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_nan_correlation_is_an_error() {
        let detector = EsNqLeadLagMirror::new(LeadLagConfig::default());
        assert!(detector.evaluate(&lead_lag_context(f64::NAN, None)).is_err());
    }
}
