//! Detectors keyed on VWAP bands and the volume profile

use serde_json::json;

use crate::common::errors::DetectorError;
use crate::common::types::Side;
use crate::config::types::{BaseDetectorConfig, SqueezeConfig};
use crate::strategy::context::PatternContext;
use crate::strategy::traits::PatternDetector;
use crate::strategy::types::{round_to_tick, CandidateSignal, PatternAffinity};

/// Tight SD1 bands breaking with a delta burst
pub struct VwapBandSqueezeBreak {
    config: SqueezeConfig,
}

impl VwapBandSqueezeBreak {
    pub fn new(config: SqueezeConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for VwapBandSqueezeBreak {
    fn name(&self) -> &str {
        "vwap_band_squeeze_break"
    }

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Breakout
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.order_flow.delta_burst
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let Some(bands) = ctx.vwap.as_ref() else {
            return Ok(None);
        };
        let (Some(upper), Some(lower)) = (bands.sd1_upper, bands.sd1_lower) else {
            return Ok(None);
        };
        if upper < lower {
            return Err(DetectorError::InvalidContext(format!(
                "SD1 bands inverted: upper {upper} below lower {lower}"
            )));
        }

        let width_ticks = (upper - lower) / ctx.tick_size;
        let flow = &ctx.order_flow;
        if width_ticks > self.config.max_band_width_ticks
            || !flow.delta_burst
            || !flow.quotes_speed_up
        {
            return Ok(None);
        }

        let (side, band) = if ctx.price > upper {
            (Side::Long, upper)
        } else if ctx.price < lower {
            (Side::Short, lower)
        } else {
            return Ok(None);
        };

        // Back inside the squeeze means the break failed
        let stop = bands.vwap;
        let signal = CandidateSignal::pattern(
            side,
            self.config.confidence,
            format!("{:.0} tick SD1 squeeze broken {}", width_ticks, side),
        )
        .with_bracket(ctx.price, stop, 2.0, ctx.tick_size)
        .with_diagnostics(json!({
            "band_width_ticks": width_ticks,
            "broken_band": band,
        }));
        Ok(Some(signal))
    }
}

/// Price inside a low-volume node, rotating back toward value
pub struct ProfileGapFill {
    config: BaseDetectorConfig,
}

impl ProfileGapFill {
    pub fn new(config: BaseDetectorConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for ProfileGapFill {
    fn name(&self) -> &str {
        "profile_gap_fill"
    }

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Reversion
    }

    fn should_run(&self, ctx: &PatternContext) -> bool {
        ctx.value_area.lvn.is_some()
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let area = &ctx.value_area;
        let Some((low, high)) = area.lvn else {
            return Ok(None);
        };
        if ctx.price < low || ctx.price > high || ctx.order_flow.absorption.is_some() {
            return Ok(None);
        }
        let Some(poc) = area.poc else {
            return Ok(None);
        };

        // Thin volume travels fast toward the next accepted edge
        let (side, target, stop) = if ctx.price > poc {
            (Side::Long, area.vah, low)
        } else {
            (Side::Short, area.val, high)
        };
        let Some(target) = target else {
            return Ok(None);
        };
        if ctx.side_toward(target) != Some(side) {
            return Ok(None);
        }

        let tick = ctx.tick_size;
        let stop = stop - side.sign() * tick;
        let signal = CandidateSignal::pattern(
            side,
            self.config.confidence,
            format!("low-volume node {:.2}-{:.2}, filling toward {:.2}", low, high, target),
        )
        .with_entry(round_to_tick(ctx.price, tick))
        .with_stop(round_to_tick(stop, tick))
        .with_target(round_to_tick(target, tick))
        .with_diagnostics(json!({
            "lvn_low": low,
            "lvn_high": high,
            "poc": poc,
        }));
        Ok(Some(signal))
    }
}
