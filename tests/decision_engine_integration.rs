//! Integration tests for the decision engine
//!
//! Most tests stub the feature source and regime classifier so that the
//! arbitration numbers are exact; the last section runs the standard
//! components end to end.

mod common;

use chrono::Duration;
use common::*;
use confluence_engine::common::types::{LevelKind, MarketContext, Side};
use confluence_engine::config::load_from_toml_str;
use confluence_engine::config::types::{EngineConfig, QualityConfig, RangeConfig};
use confluence_engine::features::{
    FeatureName, FeatureResult, FeatureSource, FeatureWeights, QualityTier,
};
use confluence_engine::regime::{DirectionalBias, Regime, RegimeResult};
use confluence_engine::strategy::{
    BoxedDetector, CandidateKind, CandidateOutcome, NoTradeReason, PatternAffinity,
    PatternContext, PatternRegistry, RangeStrategy, RegimeStrategy,
};
use std::collections::BTreeMap;
use confluence_engine::{DecisionEngine, EngineError};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================================
// Reference Scenarios
// ============================================================================

#[test]
fn test_strong_trend_with_high_confluence_is_premium() {
    let engine = DecisionEngine::builder(EngineConfig::default())
        .with_feature_source(Box::new(FixedFeatures { confluence: 0.88 }))
        .with_regime_classifier(Box::new(FixedRegime(regime(
            Regime::StrongTrendBullish,
            DirectionalBias::BullishOnly,
        ))))
        .with_trend_strategy(Box::new(FixedStrategy {
            kind: CandidateKind::Trend,
            side: Side::Long,
            confidence: 0.9,
        }))
        .with_patterns(PatternRegistry::new())
        .build()
        .unwrap();

    let decision = engine.decide(&sample_context(base_time()));

    let trade = decision.verdict.trade().expect("expected a trade");
    assert_eq!(trade.strategy, "fixed_trend");
    assert_eq!(trade.side, Side::Long);
    assert_eq!(decision.tier, QualityTier::Premium);
    assert_eq!(decision.size_multiplier, 1.5);
    // 0.6 * 0.9 + 0.4 * 0.88 + 0.05 alignment
    assert!(approx(decision.score, 0.942));
}

#[test]
fn test_range_regime_picks_higher_confidence_pattern() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.72,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![
            FixedDetector::boxed("first", Side::Long, 0.72),
            FixedDetector::boxed("second", Side::Short, 0.61),
        ],
    );

    let decision = engine.decide(&sample_context(base_time()));

    let trade = decision.verdict.trade().expect("expected a trade");
    assert_eq!(trade.strategy, "first");
    assert_eq!(decision.tier, QualityTier::Strong);
    assert_eq!(decision.size_multiplier, 1.0);
    assert!(approx(decision.score, 0.72));

    let outcomes: Vec<_> = decision
        .candidates
        .iter()
        .map(|c| (c.candidate.strategy.as_str(), c.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("first", CandidateOutcome::Selected),
            ("second", CandidateOutcome::Outscored),
        ]
    );
}

#[test]
fn test_transition_regime_never_trades() {
    let detectors = (0..5)
        .map(|i| {
            let name: &'static str = ["a", "b", "c", "d", "e"][i];
            FixedDetector::boxed(name, Side::Long, 0.8 + 0.03 * i as f64)
        })
        .collect();
    let engine = pattern_engine(
        EngineConfig::default(),
        0.9,
        RegimeResult::new(Regime::Transition, DirectionalBias::Forbidden),
        detectors,
    );

    let decision = engine.decide(&sample_context(base_time()));

    assert_eq!(
        decision.verdict.no_trade_reason(),
        Some(NoTradeReason::BiasForbidden)
    );
    assert_eq!(decision.tier, QualityTier::NoTrade);
    assert_eq!(decision.size_multiplier, 0.0);
    assert!(decision.candidates.is_empty());
}

#[test]
fn test_pattern_cooldown_blocks_refire() {
    let mut config = EngineConfig::default();
    config.cooldown.overrides.insert("sweep".to_string(), 30);
    let engine = pattern_engine(
        config,
        0.7,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![FixedDetector::boxed("sweep", Side::Long, 0.95)],
    );
    let t0 = base_time();

    let first = engine.decide(&sample_context(t0 + Duration::seconds(100)));
    assert!(first.is_trade());

    let second = engine.decide(&sample_context(t0 + Duration::seconds(110)));
    assert_eq!(
        second.verdict.no_trade_reason(),
        Some(NoTradeReason::NoEligibleCandidates)
    );
    assert_eq!(second.candidates.len(), 1);
    assert_eq!(second.candidates[0].outcome, CandidateOutcome::CoolingDown);
    assert_eq!(second.candidates[0].score, None);

    let third = engine.decide(&sample_context(t0 + Duration::seconds(131)));
    assert!(third.is_trade());
}

// ============================================================================
// Admission Tests
// ============================================================================

#[test]
fn test_cooldown_only_blocks_the_pattern_that_fired() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.7,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![
            FixedDetector::boxed("strong", Side::Long, 0.95),
            FixedDetector::boxed("steady", Side::Long, 0.8),
        ],
    );
    let t0 = base_time();

    let first = engine.decide(&sample_context(t0));
    assert_eq!(first.verdict.trade().unwrap().strategy, "strong");

    let second = engine.decide(&sample_context(t0 + Duration::seconds(5)));
    assert_eq!(second.verdict.trade().unwrap().strategy, "steady");
    assert_eq!(second.candidates[0].outcome, CandidateOutcome::CoolingDown);
}

#[test]
fn test_backwards_timestamp_stays_in_cooldown() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.7,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![FixedDetector::boxed("sweep", Side::Long, 0.95)],
    );
    let t0 = base_time();

    assert!(engine.decide(&sample_context(t0)).is_trade());
    let replayed = engine.decide(&sample_context(t0 - Duration::seconds(600)));
    assert!(!replayed.is_trade());
    assert_eq!(replayed.candidates[0].outcome, CandidateOutcome::CoolingDown);
}

#[test]
fn test_candidate_against_locked_bias_is_rejected() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.8,
        regime(Regime::WeakTrendBullish, DirectionalBias::BullishOnly),
        vec![FixedDetector::boxed("fade", Side::Short, 0.9)],
    );

    let decision = engine.decide(&sample_context(base_time()));

    assert_eq!(
        decision.verdict.no_trade_reason(),
        Some(NoTradeReason::NoEligibleCandidates)
    );
    assert_eq!(decision.candidates[0].outcome, CandidateOutcome::OpposesBias);
}

#[test]
fn test_low_confidence_candidate_is_rejected() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.9,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![FixedDetector::boxed("timid", Side::Long, 0.55)],
    );

    let decision = engine.decide(&sample_context(base_time()));

    assert_eq!(
        decision.candidates[0].outcome,
        CandidateOutcome::BelowMinimumConfidence
    );
    assert!(!decision.is_trade());
}

#[test]
fn test_weak_score_is_below_quality_and_not_cooled() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.3,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![FixedDetector::boxed("marginal", Side::Long, 0.62)],
    );

    let decision = engine.decide(&sample_context(base_time()));

    assert_eq!(
        decision.verdict.no_trade_reason(),
        Some(NoTradeReason::BelowQualityThreshold)
    );
    // 0.6 * 0.62 + 0.4 * 0.3
    assert!(approx(decision.score, 0.492));
    assert_eq!(engine.cooldowns().last_fired("marginal"), None);
}

#[test]
fn test_winner_with_wide_stop_is_risk_rejected() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.8,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![Box::new(BracketDetector {
            name: "wide_stop",
            side: Side::Long,
            stop_ticks: 24.0,
            reward_risk: 2.0,
        }) as BoxedDetector],
    );

    let decision = engine.decide(&sample_context(base_time()));

    assert_eq!(
        decision.verdict.no_trade_reason(),
        Some(NoTradeReason::RiskRejected)
    );
    assert_eq!(decision.candidates[0].outcome, CandidateOutcome::Outscored);
    assert_eq!(engine.cooldowns().last_fired("wide_stop"), None);
}

#[test]
fn test_winner_with_thin_reward_is_risk_rejected() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.8,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![Box::new(BracketDetector {
            name: "thin_reward",
            side: Side::Short,
            stop_ticks: 8.0,
            reward_risk: 1.0,
        }) as BoxedDetector],
    );

    let decision = engine.decide(&sample_context(base_time()));

    assert_eq!(
        decision.verdict.no_trade_reason(),
        Some(NoTradeReason::RiskRejected)
    );
    assert_eq!(engine.cooldowns().last_fired("thin_reward"), None);

    // The same bracket trades once the reward/risk floor is lowered
    let mut config = EngineConfig::default();
    config.scoring.min_reward_risk = 1.0;
    let engine = pattern_engine(
        config,
        0.8,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![Box::new(BracketDetector {
            name: "thin_reward",
            side: Side::Short,
            stop_ticks: 8.0,
            reward_risk: 1.0,
        }) as BoxedDetector],
    );
    let decision = engine.decide(&sample_context(base_time()));
    assert!(decision.is_trade());
    assert_eq!(
        engine.cooldowns().last_fired("thin_reward"),
        Some(base_time())
    );
}

// ============================================================================
// Ranking Tests
// ============================================================================

#[test]
fn test_ties_go_to_earlier_registration() {
    let engine = pattern_engine(
        EngineConfig::default(),
        0.8,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![
            FixedDetector::boxed("registered_first", Side::Long, 0.8),
            FixedDetector::boxed("registered_second", Side::Short, 0.8),
        ],
    );

    let decision = engine.decide(&sample_context(base_time()));
    assert_eq!(decision.verdict.trade().unwrap().strategy, "registered_first");
}

#[test]
fn test_pattern_beats_trend_strategy_on_tie() {
    let engine = DecisionEngine::builder(EngineConfig::default())
        .with_feature_source(Box::new(FixedFeatures { confluence: 0.8 }))
        .with_regime_classifier(Box::new(FixedRegime(regime(
            Regime::WeakTrendBullish,
            DirectionalBias::BullishOnly,
        ))))
        .with_trend_strategy(Box::new(FixedStrategy {
            kind: CandidateKind::Trend,
            side: Side::Long,
            confidence: 0.8,
        }))
        .with_patterns(registry(vec![FixedDetector::boxed(
            "pattern",
            Side::Long,
            0.8,
        )]))
        .build()
        .unwrap();

    let decision = engine.decide(&sample_context(base_time()));
    assert_eq!(decision.verdict.trade().unwrap().strategy, "pattern");
    assert_eq!(decision.candidates.len(), 2);
}

#[test]
fn test_breakout_bonus_applies_in_strong_trend() {
    let breakout: BoxedDetector = Box::new(FixedDetector {
        name: "breakout",
        side: Side::Long,
        confidence: 0.8,
        affinity: PatternAffinity::Breakout,
    });
    let engine = pattern_engine(
        EngineConfig::default(),
        0.8,
        regime(Regime::StrongTrendBullish, DirectionalBias::BullishOnly),
        vec![breakout, FixedDetector::boxed("neutral", Side::Long, 0.8)],
    );

    let decision = engine.decide(&sample_context(base_time()));
    assert_eq!(decision.verdict.trade().unwrap().strategy, "breakout");
    assert!(approx(decision.score, 0.8 + 0.05 + 0.06));
}

#[test]
fn test_range_strategy_skipped_in_trend_regime() {
    let engine = DecisionEngine::builder(EngineConfig::default())
        .with_feature_source(Box::new(FixedFeatures { confluence: 0.8 }))
        .with_regime_classifier(Box::new(FixedRegime(regime(
            Regime::StrongTrendBearish,
            DirectionalBias::BearishOnly,
        ))))
        .with_range_strategy(Box::new(FixedStrategy {
            kind: CandidateKind::Range,
            side: Side::Short,
            confidence: 0.9,
        }))
        .with_trend_strategy(Box::new(FixedStrategy {
            kind: CandidateKind::Trend,
            side: Side::Short,
            confidence: 0.7,
        }))
        .with_patterns(PatternRegistry::new())
        .build()
        .unwrap();

    let decision = engine.decide(&sample_context(base_time()));
    assert_eq!(decision.candidates.len(), 1);
    assert_eq!(decision.verdict.trade().unwrap().kind, CandidateKind::Trend);
}

/// Close 5000.50 two ticks above a 5000.00 to 5010.00 value area
fn value_area_context() -> MarketContext {
    let mut ctx = sample_context(base_time());
    ctx.levels.set(LevelKind::ValueAreaLow, dec!(5000.00));
    ctx.levels.set(LevelKind::ValueAreaHigh, dec!(5010.00));
    ctx
}

#[test]
fn test_range_fade_confidence_formula() {
    let ctx = value_area_context();
    let features = FeatureResult::from_values(
        BTreeMap::from([(FeatureName::LevelProximity, 0.5)]),
        vec![],
        &FeatureWeights::default(),
        &QualityConfig::default(),
    );
    let regime = regime(Regime::RangeNeutral, DirectionalBias::Unrestricted);
    let pattern_ctx = PatternContext::build(&ctx, &features, &regime);

    let signal = RangeStrategy::new(RangeConfig::default())
        .evaluate(&pattern_ctx)
        .unwrap()
        .expect("expected a fade at support");

    assert_eq!(signal.side, Side::Long);
    // 0.5 + 0.3 * (1 - 2/6) + 0.2 * 0.5
    assert!(approx(signal.confidence, 0.8));
    assert_eq!(signal.entry, Some(dec!(5000.50)));
    assert_eq!(signal.stop, Some(dec!(4998.50)));
    assert_eq!(signal.targets, vec![dec!(5005.00), dec!(5010.00)]);
}

#[test]
fn test_standard_range_strategy_wins_in_range_regime() {
    let engine = DecisionEngine::builder(EngineConfig::default())
        .with_feature_source(Box::new(FixedFeatures { confluence: 0.8 }))
        .with_regime_classifier(Box::new(FixedRegime(regime(
            Regime::RangeNeutral,
            DirectionalBias::Unrestricted,
        ))))
        .with_patterns(PatternRegistry::new())
        .build()
        .unwrap();

    let decision = engine.decide(&value_area_context());

    let trade = decision.verdict.trade().expect("expected a trade");
    assert_eq!(trade.strategy, "range_fade");
    assert_eq!(trade.side, Side::Long);
    // level proximity is neutral (0.0): confidence 0.5 + 0.3 * 2/3 = 0.7
    // score 0.6 * 0.7 + 0.4 * 0.8
    assert!(approx(decision.score, 0.74));
    assert_eq!(decision.tier, QualityTier::Strong);
}

// ============================================================================
// Fault Isolation Tests
// ============================================================================

#[test_log::test]
fn test_failing_detectors_do_not_change_decision() {
    let healthy = pattern_engine(
        EngineConfig::default(),
        0.75,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![FixedDetector::boxed("good", Side::Long, 0.8)],
    );
    let faulty = pattern_engine(
        EngineConfig::default(),
        0.75,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![
            Box::new(FailingDetector("broken")) as BoxedDetector,
            Box::new(PanickingDetector("boom")),
            FixedDetector::boxed("good", Side::Long, 0.8),
        ],
    );
    let ctx = sample_context(base_time());

    let expected = healthy.decide(&ctx);
    let actual = faulty.decide(&ctx);

    assert_eq!(actual.verdict, expected.verdict);
    assert_eq!(actual.score, expected.score);
    assert_eq!(actual.candidates, expected.candidates);
    assert_eq!(actual.failed_detectors, vec!["broken", "boom"]);

    let stats = faulty.stats();
    assert_eq!(stats.detector_failures.get("boom"), Some(&1));
}

struct PanickingFeatures;

impl FeatureSource for PanickingFeatures {
    fn compute(&self, _ctx: &MarketContext) -> FeatureResult {
        panic!("feature source corrupted")
    }
}

#[test_log::test]
fn test_pipeline_panic_yields_engine_fault() {
    let engine = DecisionEngine::builder(EngineConfig::default())
        .with_feature_source(Box::new(PanickingFeatures))
        .build()
        .unwrap();

    let decision = engine.decide(&sample_context(base_time()));

    assert_eq!(
        decision.verdict.no_trade_reason(),
        Some(NoTradeReason::EngineFault)
    );
    assert_eq!(decision.regime, Regime::Unclear);
    assert_eq!(engine.stats().no_trades.get("engine_fault"), Some(&1));
}

#[test_log::test]
fn test_tick_budget_overrun_is_no_trade() {
    let mut config = EngineConfig::default();
    config.settings.tick_budget_ms = 1;
    let engine = pattern_engine(
        config,
        0.9,
        regime(Regime::RangeNeutral, DirectionalBias::Unrestricted),
        vec![
            Box::new(SlowDetector {
                name: "slow",
                delay: std::time::Duration::from_millis(5),
            }) as BoxedDetector,
            FixedDetector::boxed("good", Side::Long, 0.95),
        ],
    );

    let decision = engine.decide(&sample_context(base_time()));

    assert_eq!(
        decision.verdict.no_trade_reason(),
        Some(NoTradeReason::LatencyBudgetExceeded)
    );
    assert!(decision.elapsed_micros >= 5_000);
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_bad_weights_refuse_to_start() {
    let err = load_from_toml_str(
        r#"
        [features.weights]
        gamma_proximity = 0.5
        volume_confirmation = 0.15
        trend_slope = 0.15
        pattern_strength = 0.15
        regime_structure = 0.10
        options_flow_bias = 0.08
        cross_symbol_correlation = 0.07
        level_proximity = 0.05
        session_context = 0.03
        pullback_quality = 0.02
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidWeights { .. }));
}

#[test]
fn test_duplicate_detector_refuses_to_register() {
    let mut registry = PatternRegistry::new();
    registry
        .register(FixedDetector::boxed("twin", Side::Long, 0.7))
        .unwrap();
    let err = registry
        .register(FixedDetector::boxed("twin", Side::Short, 0.7))
        .unwrap_err();
    assert_eq!(err, EngineError::DuplicateDetector("twin".to_string()));
}

#[test]
fn test_cooldown_override_from_toml() {
    let config = load_from_toml_str(
        r#"
        [cooldown]
        default_seconds = 90

        [cooldown.overrides]
        liquidity_sweep_reversal = 15
        "#,
    )
    .unwrap();
    assert_eq!(
        config.cooldown.window_for("liquidity_sweep_reversal"),
        Duration::seconds(15)
    );
    assert_eq!(
        config.cooldown.window_for("profile_gap_fill"),
        Duration::seconds(90)
    );
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[test_log::test]
fn test_standard_engine_on_bullish_trend() {
    let engine = DecisionEngine::new(EngineConfig::default()).unwrap();
    let ctx = context_from_closes(&zigzag(6, dec!(1.0), dec!(0.5)));

    let decision = engine.decide(&ctx);

    assert_eq!(decision.regime, Regime::StrongTrendBullish);
    assert_eq!(decision.bias, DirectionalBias::BullishOnly);
    for report in &decision.candidates {
        if report.candidate.side == Side::Short {
            assert_eq!(report.outcome, CandidateOutcome::OpposesBias);
        }
    }
    if let Some(trade) = decision.verdict.trade() {
        assert_eq!(trade.side, Side::Long);
    }
    assert!((0.0..=1.0).contains(&decision.confluence_score));
}

#[test]
fn test_json_snapshot_in_json_decision_out() {
    let engine = DecisionEngine::new(EngineConfig::default()).unwrap();
    let snapshot = r#"{
        "symbol": "NQ",
        "timestamp": "2025-03-03T15:00:00Z",
        "bar": {
            "timestamp": "2025-03-03T15:00:00Z",
            "open": "18000.00", "high": "18004.00", "low": "17998.00", "close": "18002.00",
            "volume": "850"
        },
        "tick_size": "0.25",
        "order_flow": { "delta_burst": true, "quotes_speed_up": true }
    }"#;
    let ctx: MarketContext = serde_json::from_str(snapshot).unwrap();

    let decision = engine.decide(&ctx);
    let json = serde_json::to_value(&decision).unwrap();

    assert_eq!(json["symbol"], "NQ");
    assert_eq!(json["verdict"]["action"], "no_trade");
    assert_eq!(json["verdict"]["reason"], "bias_forbidden");
    assert_eq!(json["tier"], "no_trade");
}
