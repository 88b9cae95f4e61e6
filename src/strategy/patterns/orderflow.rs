//! Detectors keyed on order-flow events

use serde_json::json;

use crate::common::errors::DetectorError;
use crate::common::types::to_f64;
use crate::config::types::{BaseDetectorConfig, IcebergConfig, ImbalanceConfig, SweepConfig};
use crate::strategy::context::PatternContext;
use crate::strategy::traits::PatternDetector;
use crate::strategy::types::{CandidateSignal, PatternAffinity};

/// Stop run through liquidity, then absorbed and reversed
pub struct LiquiditySweepReversal {
    config: SweepConfig,
}

impl LiquiditySweepReversal {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for LiquiditySweepReversal {
    fn name(&self) -> &str {
        "liquidity_sweep_reversal"
    }

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Reversion
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.last_wick_ticks >= self.config.min_wick_ticks
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        if ctx.last_wick_ticks < self.config.min_wick_ticks || !ctx.order_flow.delta_flip {
            return Ok(None);
        }
        let Some(absorption) = ctx.order_flow.absorption.as_ref() else {
            return Ok(None);
        };

        let side = absorption.side.fade();
        let extra_wick = ctx.last_wick_ticks - self.config.min_wick_ticks;
        let confidence = self.config.confidence + (0.01 * extra_wick).min(0.06);
        // Stop beyond the swept extreme
        let stop = ctx.price - side.sign() * (ctx.last_wick_ticks + 2.0) * ctx.tick_size;

        let signal = CandidateSignal::pattern(
            side,
            confidence,
            format!(
                "{:.0} tick sweep, {} absorbed after delta flip",
                ctx.last_wick_ticks, absorption.side
            ),
        )
        .with_bracket(ctx.price, stop, 2.0, ctx.tick_size)
        .with_diagnostics(json!({
            "wick_ticks": ctx.last_wick_ticks,
            "absorption_price": to_f64(absorption.price),
        }));
        Ok(Some(signal))
    }
}

/// Stacked imbalance rows in the direction price is already leaning
pub struct StackedImbalanceContinuation {
    config: ImbalanceConfig,
}

impl StackedImbalanceContinuation {
    pub fn new(config: ImbalanceConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for StackedImbalanceContinuation {
    fn name(&self) -> &str {
        "stacked_imbalance_continuation"
    }

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Breakout
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.order_flow.stacked_imbalance.is_some()
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let Some(imbalance) = ctx.order_flow.stacked_imbalance.as_ref() else {
            return Ok(None);
        };
        if imbalance.rows < self.config.min_rows {
            return Ok(None);
        }
        let side = imbalance.side.follow();
        if ctx.side_vs_vwap() != Some(side) {
            return Ok(None);
        }

        let extra_rows = (imbalance.rows - self.config.min_rows) as f64;
        let confidence = self.config.confidence + (0.02 * extra_rows).min(0.08);
        let stop = ctx.price - side.sign() * ctx.atr;

        let signal = CandidateSignal::pattern(
            side,
            confidence,
            format!("{} stacked {} imbalance rows", imbalance.rows, imbalance.side),
        )
        .with_bracket(ctx.price, stop, 2.0, ctx.tick_size)
        .with_diagnostics(json!({ "rows": imbalance.rows }));
        Ok(Some(signal))
    }
}

/// Trade alongside a refilling hidden order near price
pub struct IcebergTrackerFollow {
    config: IcebergConfig,
}

impl IcebergTrackerFollow {
    pub fn new(config: IcebergConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for IcebergTrackerFollow {
    fn name(&self) -> &str {
        "iceberg_tracker_follow"
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.order_flow.iceberg.is_some()
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let Some(iceberg) = ctx.order_flow.iceberg.as_ref() else {
            return Ok(None);
        };
        let iceberg_price = to_f64(iceberg.price);
        if iceberg_price <= 0.0 {
            return Err(DetectorError::InvalidContext(format!(
                "iceberg price {} is not positive",
                iceberg.price
            )));
        }
        let distance = ctx.ticks_from(iceberg_price);
        if distance > self.config.max_dist_ticks {
            return Ok(None);
        }

        let side = iceberg.side.follow();
        // Invalidated once price trades through the hidden order
        let stop = iceberg_price - side.sign() * 2.0 * ctx.tick_size;
        let signal = CandidateSignal::pattern(
            side,
            self.config.confidence,
            format!("{} iceberg {:.0} ticks away", iceberg.side, distance),
        )
        .with_bracket(ctx.price, stop, 2.0, ctx.tick_size)
        .with_diagnostics(json!({
            "iceberg_price": iceberg_price,
            "distance_ticks": distance,
        }));
        Ok(Some(signal))
    }
}

/// Cumulative delta diverging from price while the push is absorbed
pub struct CvdDivergenceTrap {
    config: BaseDetectorConfig,
}

impl CvdDivergenceTrap {
    pub fn new(config: BaseDetectorConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for CvdDivergenceTrap {
    fn name(&self) -> &str {
        "cvd_divergence_trap"
    }

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Reversion
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.order_flow.cvd_divergence
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        if !ctx.order_flow.cvd_divergence {
            return Ok(None);
        }
        let Some(absorption) = ctx.order_flow.absorption.as_ref() else {
            return Ok(None);
        };

        let side = absorption.side.fade();
        let stop = ctx.price - side.sign() * ctx.atr;
        let signal = CandidateSignal::pattern(
            side,
            self.config.confidence,
            format!("CVD divergence, trapped {} flow", absorption.side),
        )
        .with_bracket(ctx.price, stop, 2.0, ctx.tick_size)
        .with_diagnostics(json!({
            "cumulative_delta": to_f64(ctx.order_flow.cumulative_delta),
        }));
        Ok(Some(signal))
    }
}
