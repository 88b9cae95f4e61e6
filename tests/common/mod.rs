//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use confluence_engine::common::errors::DetectorError;
use confluence_engine::common::types::{Bar, MarketContext, Side};
use confluence_engine::config::types::{EngineConfig, QualityConfig};
use confluence_engine::features::{FeatureResult, FeatureSource, FeatureWeights};
use confluence_engine::regime::{DirectionalBias, Regime, RegimeClassifier, RegimeResult};
use confluence_engine::strategy::{
    BoxedDetector, CandidateKind, CandidateSignal, PatternAffinity, PatternContext,
    PatternDetector, PatternRegistry, RegimeStrategy,
};
use confluence_engine::DecisionEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

/// Monday afternoon session, 15:00 UTC
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap()
}

/// Single-bar ES snapshot at `timestamp`
pub fn sample_context(timestamp: DateTime<Utc>) -> MarketContext {
    MarketContext {
        symbol: "ES".to_string(),
        timestamp,
        bar: Bar::new(
            timestamp,
            dec!(5000.00),
            dec!(5001.00),
            dec!(4999.50),
            dec!(5000.50),
            dec!(1200),
        ),
        history: vec![],
        tick_size: dec!(0.25),
        order_flow: Default::default(),
        levels: Default::default(),
        options: None,
        cross_symbol: None,
        volatility: None,
    }
}

/// Snapshot whose bars close at `closes`, one minute apart
pub fn context_from_closes(closes: &[Decimal]) -> MarketContext {
    let t0 = base_time();
    let mut bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            Bar::new(
                t0 + Duration::minutes(i as i64),
                *close,
                *close + dec!(0.25),
                *close - dec!(0.25),
                *close,
                dec!(500),
            )
        })
        .collect();
    let bar = bars.pop().unwrap();
    let mut ctx = sample_context(bar.timestamp);
    ctx.bar = bar;
    ctx.history = bars;
    ctx
}

/// Three bars up, two back, repeated
pub fn zigzag(cycles: usize, up: Decimal, down: Decimal) -> Vec<Decimal> {
    let mut price = dec!(5000);
    let mut closes = vec![price];
    for _ in 0..cycles {
        for _ in 0..3 {
            price += up;
            closes.push(price);
        }
        for _ in 0..2 {
            price -= down;
            closes.push(price);
        }
    }
    closes
}

// ============================================================================
// Stub components
// ============================================================================

/// Feature source with a fixed confluence score
pub struct FixedFeatures {
    pub confluence: f64,
}

impl FeatureSource for FixedFeatures {
    fn compute(&self, _ctx: &MarketContext) -> FeatureResult {
        let mut result = FeatureResult::from_values(
            BTreeMap::new(),
            vec![],
            &FeatureWeights::default(),
            &QualityConfig::default(),
        );
        result.confluence_score = self.confluence;
        result
    }
}

/// Classifier that always reports the same regime
pub struct FixedRegime(pub RegimeResult);

impl RegimeClassifier for FixedRegime {
    fn classify(&self, _ctx: &MarketContext, _features: &FeatureResult) -> RegimeResult {
        self.0.clone()
    }
}

pub fn regime(regime: Regime, bias: DirectionalBias) -> RegimeResult {
    RegimeResult::new(regime, bias).with_trend_strength(0.8)
}

/// Detector that proposes the same candidate every tick
pub struct FixedDetector {
    pub name: &'static str,
    pub side: Side,
    pub confidence: f64,
    pub affinity: PatternAffinity,
}

impl FixedDetector {
    pub fn boxed(name: &'static str, side: Side, confidence: f64) -> BoxedDetector {
        Box::new(Self {
            name,
            side,
            confidence,
            affinity: PatternAffinity::Neutral,
        })
    }
}

impl PatternDetector for FixedDetector {
    fn name(&self) -> &str {
        self.name
    }

    fn affinity(&self) -> PatternAffinity {
        self.affinity
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let stop = ctx.price - self.side.sign() * 2.0;
        Ok(Some(
            CandidateSignal::pattern(self.side, self.confidence, format!("{} fired", self.name))
                .with_bracket(ctx.price, stop, 2.0, ctx.tick_size),
        ))
    }
}

/// Detector with a fixed bracket: stop `stop_ticks` away, target at `reward_risk`
pub struct BracketDetector {
    pub name: &'static str,
    pub side: Side,
    pub stop_ticks: f64,
    pub reward_risk: f64,
}

impl PatternDetector for BracketDetector {
    fn name(&self) -> &str {
        self.name
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let stop = ctx.price - self.side.sign() * self.stop_ticks * ctx.tick_size;
        Ok(Some(
            CandidateSignal::pattern(self.side, 0.9, format!("{} fired", self.name))
                .with_bracket(ctx.price, stop, self.reward_risk, ctx.tick_size),
        ))
    }
}

/// Detector that always reports bad input
pub struct FailingDetector(pub &'static str);

impl PatternDetector for FailingDetector {
    fn name(&self) -> &str {
        self.0
    }

    fn evaluate(&self, _ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        Err(DetectorError::MissingInput("order_flow.iceberg"))
    }
}

/// Detector that panics mid-evaluation
pub struct PanickingDetector(pub &'static str);

impl PatternDetector for PanickingDetector {
    fn name(&self) -> &str {
        self.0
    }

    fn evaluate(&self, _ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        panic!("index out of bounds in {}", self.0)
    }
}

/// Detector that blocks for `delay` before proposing nothing
pub struct SlowDetector {
    pub name: &'static str,
    pub delay: std::time::Duration,
}

impl PatternDetector for SlowDetector {
    fn name(&self) -> &str {
        self.name
    }

    fn evaluate(&self, _ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        std::thread::sleep(self.delay);
        Ok(None)
    }
}

/// Trend or range strategy with a fixed proposal
pub struct FixedStrategy {
    pub kind: CandidateKind,
    pub side: Side,
    pub confidence: f64,
}

impl RegimeStrategy for FixedStrategy {
    fn name(&self) -> &str {
        match self.kind {
            CandidateKind::Trend => "fixed_trend",
            CandidateKind::Range => "fixed_range",
            CandidateKind::Pattern => "fixed_pattern",
        }
    }

    fn kind(&self) -> CandidateKind {
        self.kind
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
        let stop = ctx.price - self.side.sign() * 2.0;
        Ok(Some(
            CandidateSignal::new(self.name(), self.kind, self.side, self.confidence, "fixed")
                .with_bracket(ctx.price, stop, 2.0, ctx.tick_size),
        ))
    }
}

pub fn registry(detectors: Vec<BoxedDetector>) -> PatternRegistry {
    let mut registry = PatternRegistry::new();
    for detector in detectors {
        registry.register(detector).unwrap();
    }
    registry
}

/// Engine with stubbed features and regime, patterns only
pub fn pattern_engine(
    config: EngineConfig,
    confluence: f64,
    regime: RegimeResult,
    detectors: Vec<BoxedDetector>,
) -> DecisionEngine {
    DecisionEngine::builder(config)
        .with_feature_source(Box::new(FixedFeatures { confluence }))
        .with_regime_classifier(Box::new(FixedRegime(regime)))
        .without_regime_strategies()
        .with_patterns(registry(detectors))
        .build()
        .unwrap()
}
