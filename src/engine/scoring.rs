use crate::common::math::clamp01;
use crate::common::types::to_f64;
use crate::config::types::ScoringConfig;
use crate::regime::RegimeResult;
use crate::strategy::{CandidateKind, CandidateSignal, PatternAffinity};

/// Final score of an admitted candidate, in [0, 1]
///
/// Weighted confidence and confluence, plus a bonus when the side matches a
/// locked bias and a bonus when a pattern's affinity suits the regime.
pub fn score_candidate(
    candidate: &CandidateSignal,
    regime: &RegimeResult,
    confluence: f64,
    config: &ScoringConfig,
) -> f64 {
    let mut score =
        config.confidence_weight * candidate.confidence + config.confluence_weight * confluence;

    if regime.bias.locked_side() == Some(candidate.side) {
        score += config.alignment_bonus;
    }

    if candidate.kind == CandidateKind::Pattern {
        score += match candidate.affinity {
            PatternAffinity::Breakout if regime.regime.is_strong_trend() => {
                config.breakout_trend_bonus
            }
            PatternAffinity::Reversion if regime.regime.is_range() => config.reversion_range_bonus,
            _ => 0.0,
        };
    }

    clamp01(score)
}

/// Whether a winner's bracket is tradeable: stop within `max_risk_ticks` and
/// the farthest target paying at least `min_reward_risk` (risk floored at one tick)
pub fn within_risk_limits(candidate: &CandidateSignal, tick: f64, config: &ScoringConfig) -> bool {
    let Some(entry) = candidate.entry.map(to_f64) else {
        return true;
    };
    let risk_ticks = candidate
        .stop
        .map(|stop| (entry - to_f64(stop)).abs() / tick)
        .unwrap_or(0.0);
    if risk_ticks > config.max_risk_ticks {
        return false;
    }

    let reward_ticks = candidate
        .targets
        .iter()
        .map(|target| (to_f64(*target) - entry).abs() / tick)
        .reduce(f64::max);
    match reward_ticks {
        Some(reward) => reward / risk_ticks.max(1.0) >= config.min_reward_risk,
        None => true,
    }
}
