//! Detectors keyed on options-gamma levels

use serde_json::json;

use crate::common::errors::DetectorError;
use crate::common::types::{SessionPhase, Side};
use crate::config::types::{BaseDetectorConfig, OpeningDriveConfig, WallDetectorConfig};
use crate::strategy::context::{PatternContext, WallKind};
use crate::strategy::traits::PatternDetector;
use crate::strategy::types::{round_to_tick, CandidateSignal, PatternAffinity};

/// Price pinned near a dealer wall with the push into it being absorbed
pub struct GammaPinReversion {
    config: WallDetectorConfig,
}

impl GammaPinReversion {
    pub fn new(config: WallDetectorConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for GammaPinReversion {
    fn name(&self) -> &str {
        "gamma_pin_reversion"
    }

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Reversion
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.gamma.call_wall.is_some() || ctx.gamma.put_wall.is_some()
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let Some(wall) = ctx.nearest_wall() else {
            return Ok(None);
        };
        if wall.distance_ticks > self.config.max_wall_dist_ticks {
            return Ok(None);
        }
        let Some(absorption) = ctx.order_flow.absorption.as_ref() else {
            return Ok(None);
        };

        // The reversal has to point back toward the pin
        let side = absorption.side.fade();
        if ctx.side_toward(wall.price) != Some(side) {
            return Ok(None);
        }

        let closeness = 1.0 - wall.distance_ticks / self.config.max_wall_dist_ticks;
        let confidence = self.config.confidence + 0.10 * closeness;
        let tick = ctx.tick_size;
        let signal = CandidateSignal::pattern(
            side,
            confidence,
            format!(
                "{:?} wall {:.1} ticks away, {} absorbed",
                wall.kind, wall.distance_ticks, absorption.side
            ),
        )
        .with_entry(round_to_tick(ctx.price, tick))
        .with_stop(round_to_tick(ctx.price - side.sign() * ctx.atr, tick))
        .with_target(round_to_tick(wall.price, tick))
        .with_diagnostics(json!({
            "wall_price": wall.price,
            "wall_distance_ticks": wall.distance_ticks,
        }));
        Ok(Some(signal))
    }
}

/// Dealers crossing the gamma flip with order flow accelerating
pub struct DealerFlipBreakout {
    config: BaseDetectorConfig,
}

impl DealerFlipBreakout {
    pub fn new(config: BaseDetectorConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for DealerFlipBreakout {
    fn name(&self) -> &str {
        "dealer_flip_breakout"
    }

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Breakout
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.gamma.flip_active
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let flow = &ctx.order_flow;
        if !(ctx.gamma.flip_active && flow.delta_burst && flow.quotes_speed_up) {
            return Ok(None);
        }
        let Some(side) = ctx.side_vs_vwap() else {
            return Ok(None);
        };

        let stop = ctx.price - side.sign() * ctx.atr;
        let signal = CandidateSignal::pattern(side, self.config.confidence, "gamma flip breakout")
            .with_bracket(ctx.price, stop, 2.0, ctx.tick_size)
            .with_diagnostics(json!({
                "gamma_flip": ctx.gamma.gamma_flip,
                "net_gamma": ctx.gamma.net_gamma,
            }));
        Ok(Some(signal))
    }
}

/// Opening drive stalling into a wall while volatility rises
pub struct OpeningDriveFail {
    config: OpeningDriveConfig,
}

impl OpeningDriveFail {
    pub fn new(config: OpeningDriveConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for OpeningDriveFail {
    fn name(&self) -> &str {
        "opening_drive_fail"
    }

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Reversion
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.session == SessionPhase::NyOpen
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let Some(wall) = ctx.nearest_wall() else {
            return Ok(None);
        };
        let vol_rising = ctx.volatility.as_ref().map_or(false, |v| v.rising);
        if wall.distance_ticks > self.config.max_wall_dist_ticks
            || ctx.order_flow.delta_burst
            || !vol_rising
        {
            return Ok(None);
        }

        // A drive up stalls under a call wall, a drive down above a put wall
        let Some(drive) = ctx.side_toward(wall.price) else {
            return Ok(None);
        };
        let expected = match wall.kind {
            WallKind::Call => Side::Long,
            WallKind::Put => Side::Short,
        };
        if drive != expected {
            return Ok(None);
        }

        let side = drive.opposite();
        let stop = wall.price + drive.sign() * ctx.tick_size * 2.0;
        let signal = CandidateSignal::pattern(
            side,
            self.config.confidence,
            format!("opening drive failing at {:?} wall", wall.kind),
        )
        .with_bracket(ctx.price, stop, 1.5, ctx.tick_size)
        .with_diagnostics(json!({
            "wall_price": wall.price,
            "wall_distance_ticks": wall.distance_ticks,
        }));
        Ok(Some(signal))
    }
}
