//! Per-tick orchestration
//!
//! [`DecisionEngine::decide`] runs features, regime, strategies and
//! detectors, then arbitrates the candidates into one [`TradingDecision`].
//! It never fails: every fault degrades to a logged no-trade.

mod cooldown;
mod scoring;
mod stats;

pub use cooldown::CooldownState;
pub use scoring::{score_candidate, within_risk_limits};
pub use stats::{EngineStats, EngineStatsSnapshot};

use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::common::errors::{isolate, DetectorError, EngineError, Result};
use crate::common::math::clamp01;
use crate::common::timing::TickBudget;
use crate::common::types::MarketContext;
use crate::config::types::EngineConfig;
use crate::features::{FeatureCalculator, FeatureResult, FeatureSource, QualityTier};
use crate::regime::{DirectionalBias, MarketRegimeDetector, RegimeClassifier, RegimeResult};
use crate::strategy::{
    BoxedRegimeStrategy, CandidateKind, CandidateOutcome, CandidateReport, CandidateSignal,
    NoTradeReason, PatternContext, PatternDetector, PatternRegistry, RangeStrategy,
    RegimeStrategy, SelectedTrade, TradingDecision, TrendStrategy, Verdict,
};

/// The confluence decision engine
///
/// Holds the immutable configuration, the pluggable components and the two
/// pieces of shared state (feature cache inside the feature source, and the
/// pattern cooldowns). `Send + Sync`; `decide` takes `&self`.
pub struct DecisionEngine {
    config: EngineConfig,
    features: Box<dyn FeatureSource>,
    classifier: Box<dyn RegimeClassifier>,
    trend: Option<BoxedRegimeStrategy>,
    range: Option<BoxedRegimeStrategy>,
    patterns: PatternRegistry,
    cooldowns: CooldownState,
    stats: EngineStats,
}

impl DecisionEngine {
    /// Engine with the standard components for `config`
    pub fn new(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered detector names in evaluation order
    pub fn pattern_names(&self) -> Vec<String> {
        self.patterns.names()
    }

    pub fn cooldowns(&self) -> &CooldownState {
        &self.cooldowns
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot(self.features.cache_stats())
    }

    /// Decide one tick
    pub fn decide(&self, ctx: &MarketContext) -> TradingDecision {
        let started = Instant::now();
        let budget = TickBudget::start(Duration::from_millis(self.config.settings.tick_budget_ms));

        let mut decision = match isolate(|| self.evaluate(ctx, &budget)) {
            Ok(decision) => decision,
            Err(msg) => {
                error!(symbol = %ctx.symbol, error = %msg, "Decision pipeline panicked");
                let mut decision = blank_decision(ctx, None, &RegimeResult::unclear());
                decision.verdict = Verdict::no_trade(NoTradeReason::EngineFault);
                decision
            }
        };

        let elapsed = started.elapsed();
        decision.elapsed_micros = elapsed.as_micros() as u64;
        self.stats.record(&decision, elapsed);

        let verdict = match &decision.verdict {
            Verdict::Trade(trade) => format!("{} {}", trade.side, trade.strategy),
            Verdict::NoTrade { reason } => reason.to_string(),
        };
        info!(
            symbol = %decision.symbol,
            verdict = %verdict,
            tier = %decision.tier,
            score = decision.score,
            regime = %decision.regime,
            candidates = decision.candidates.len(),
            elapsed_us = decision.elapsed_micros,
            "Decision"
        );
        decision
    }

    fn evaluate(&self, ctx: &MarketContext, budget: &TickBudget) -> TradingDecision {
        let features = self.features.compute(ctx);
        let regime = isolate(|| self.classifier.classify(ctx, &features)).unwrap_or_else(|msg| {
            warn!(symbol = %ctx.symbol, error = %msg, "Regime classifier panicked, treating as unclear");
            RegimeResult::unclear()
        });
        debug!(
            regime = %regime.regime,
            bias = %regime.bias,
            strength = regime.trend_strength,
            confluence = features.confluence_score,
            "Regime classified"
        );

        let mut decision = blank_decision(ctx, Some(&features), &regime);
        if regime.bias == DirectionalBias::Forbidden {
            decision.verdict = Verdict::no_trade(NoTradeReason::BiasForbidden);
            return decision;
        }

        let pattern_ctx = PatternContext::build(ctx, &features, &regime);
        let mut proposals = Vec::new();

        for detector in self.patterns.iter() {
            if budget.exceeded() {
                return self.overrun(decision, budget, detector.name());
            }
            match run_detector(detector, &pattern_ctx) {
                Ok(Some(candidate)) => proposals.push(candidate),
                Ok(None) => {}
                Err(e) => {
                    warn!(detector = detector.name(), symbol = %ctx.symbol, error = %e, "Detector failed");
                    decision.failed_detectors.push(detector.name().to_string());
                }
            }
        }

        for strategy in [&self.trend, &self.range].into_iter().flatten() {
            let applies = match strategy.kind() {
                CandidateKind::Trend => regime.regime.is_trend(),
                CandidateKind::Range => regime.regime.is_range(),
                CandidateKind::Pattern => false,
            };
            if !applies {
                continue;
            }
            match run_strategy(strategy.as_ref(), &pattern_ctx) {
                Ok(Some(candidate)) => proposals.push(candidate),
                Ok(None) => {}
                Err(e) => {
                    warn!(strategy = strategy.name(), symbol = %ctx.symbol, error = %e, "Strategy failed");
                    decision.failed_detectors.push(strategy.name().to_string());
                }
            }
        }

        if budget.exceeded() {
            return self.overrun(decision, budget, "arbitration");
        }

        self.arbitrate(ctx, proposals, &regime, decision)
    }

    fn overrun(&self, mut decision: TradingDecision, budget: &TickBudget, at: &str) -> TradingDecision {
        warn!(
            symbol = %decision.symbol,
            elapsed_us = budget.elapsed().as_micros() as u64,
            budget_us = budget.budget().as_micros() as u64,
            skipped_from = at,
            "Tick budget exceeded"
        );
        decision.verdict = Verdict::no_trade(NoTradeReason::LatencyBudgetExceeded);
        decision
    }

    /// Admission, scoring and selection over the proposed candidates
    fn arbitrate(
        &self,
        ctx: &MarketContext,
        proposals: Vec<CandidateSignal>,
        regime: &RegimeResult,
        mut decision: TradingDecision,
    ) -> TradingDecision {
        let scoring = &self.config.scoring;
        let mut reports = Vec::with_capacity(proposals.len());
        let mut best: Option<(usize, f64)> = None;

        for candidate in proposals {
            let rejected = if !regime.bias.allows(candidate.side) {
                Some(CandidateOutcome::OpposesBias)
            } else if candidate.confidence < scoring.min_candidate_confidence {
                Some(CandidateOutcome::BelowMinimumConfidence)
            } else if candidate.kind == CandidateKind::Pattern
                && self.cooldowns.is_cooling(
                    &candidate.strategy,
                    ctx.timestamp,
                    self.config.cooldown.window_for(&candidate.strategy),
                )
            {
                Some(CandidateOutcome::CoolingDown)
            } else {
                None
            };

            let report = match rejected {
                Some(outcome) => {
                    debug!(strategy = %candidate.strategy, ?outcome, "Candidate rejected");
                    CandidateReport {
                        candidate,
                        score: None,
                        outcome,
                    }
                }
                None => {
                    let score =
                        score_candidate(&candidate, regime, decision.confluence_score, scoring);
                    debug!(strategy = %candidate.strategy, side = %candidate.side, score, "Candidate scored");
                    // Strictly greater keeps the earlier source on ties
                    if best.map_or(true, |(_, top)| score > top) {
                        best = Some((reports.len(), score));
                    }
                    CandidateReport {
                        candidate,
                        score: Some(score),
                        outcome: CandidateOutcome::Outscored,
                    }
                }
            };
            reports.push(report);
        }
        decision.candidates = reports;

        let Some((index, score)) = best else {
            decision.verdict = Verdict::no_trade(NoTradeReason::NoEligibleCandidates);
            return decision;
        };
        decision.score = score;

        let tier = self.config.quality.thresholds.tier_for(score);
        if tier == QualityTier::NoTrade {
            decision.verdict = Verdict::no_trade(NoTradeReason::BelowQualityThreshold);
            return decision;
        }

        if !within_risk_limits(&decision.candidates[index].candidate, ctx.tick(), scoring) {
            warn!(
                strategy = %decision.candidates[index].candidate.strategy,
                "Winner rejected by risk limits"
            );
            decision.verdict = Verdict::no_trade(NoTradeReason::RiskRejected);
            return decision;
        }

        let winner = &mut decision.candidates[index];
        winner.outcome = CandidateOutcome::Selected;
        if winner.candidate.kind == CandidateKind::Pattern {
            self.cooldowns.record(&winner.candidate.strategy, ctx.timestamp);
        }
        decision.verdict = Verdict::Trade(SelectedTrade::from_candidate(&winner.candidate));
        decision.tier = tier;
        decision.size_multiplier = self.config.quality.multipliers.for_tier(tier);
        decision
    }
}

/// Assembles a [`DecisionEngine`], defaulting any component not supplied
pub struct EngineBuilder {
    config: EngineConfig,
    features: Option<Box<dyn FeatureSource>>,
    classifier: Option<Box<dyn RegimeClassifier>>,
    trend: Option<BoxedRegimeStrategy>,
    range: Option<BoxedRegimeStrategy>,
    patterns: Option<PatternRegistry>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        let trend: BoxedRegimeStrategy = Box::new(TrendStrategy::new(config.strategies.trend.clone()));
        let range: BoxedRegimeStrategy = Box::new(RangeStrategy::new(config.strategies.range.clone()));
        Self {
            config,
            features: None,
            classifier: None,
            trend: Some(trend),
            range: Some(range),
            patterns: None,
        }
    }

    pub fn with_feature_source(mut self, source: Box<dyn FeatureSource>) -> Self {
        self.features = Some(source);
        self
    }

    pub fn with_regime_classifier(mut self, classifier: Box<dyn RegimeClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_trend_strategy(mut self, strategy: BoxedRegimeStrategy) -> Self {
        self.trend = Some(strategy);
        self
    }

    pub fn with_range_strategy(mut self, strategy: BoxedRegimeStrategy) -> Self {
        self.range = Some(strategy);
        self
    }

    /// Run patterns only
    pub fn without_regime_strategies(mut self) -> Self {
        self.trend = None;
        self.range = None;
        self
    }

    pub fn with_patterns(mut self, patterns: PatternRegistry) -> Self {
        self.patterns = Some(patterns);
        self
    }

    pub fn build(self) -> Result<DecisionEngine> {
        self.config.validate()?;

        for (slot, expected) in [(&self.trend, CandidateKind::Trend), (&self.range, CandidateKind::Range)] {
            if let Some(strategy) = slot {
                if strategy.kind() != expected {
                    return Err(EngineError::Configuration(format!(
                        "strategy {} has kind {:?}, expected {:?}",
                        strategy.name(),
                        strategy.kind(),
                        expected
                    )));
                }
            }
        }

        let patterns = match self.patterns {
            Some(patterns) => patterns,
            None => PatternRegistry::standard(&self.config.detectors)?,
        };
        let features: Box<dyn FeatureSource> = match self.features {
            Some(source) => source,
            None => Box::new(FeatureCalculator::new(&self.config)),
        };
        let classifier: Box<dyn RegimeClassifier> = match self.classifier {
            Some(classifier) => classifier,
            None => Box::new(MarketRegimeDetector::new(self.config.regime.clone())),
        };

        info!(
            patterns = patterns.len(),
            trend = self.trend.is_some(),
            range = self.range.is_some(),
            tick_budget_ms = self.config.settings.tick_budget_ms,
            "Decision engine initialized"
        );

        Ok(DecisionEngine {
            stats: EngineStats::new(self.config.settings.latency_window),
            config: self.config,
            features,
            classifier,
            trend: self.trend,
            range: self.range,
            patterns,
            cooldowns: CooldownState::new(),
        })
    }
}

/// Decision skeleton: no trade, nothing scored
fn blank_decision(
    ctx: &MarketContext,
    features: Option<&FeatureResult>,
    regime: &RegimeResult,
) -> TradingDecision {
    TradingDecision {
        symbol: ctx.symbol.clone(),
        timestamp: ctx.timestamp,
        verdict: Verdict::no_trade(NoTradeReason::NoEligibleCandidates),
        tier: QualityTier::NoTrade,
        size_multiplier: 0.0,
        score: 0.0,
        regime: regime.regime,
        bias: regime.bias,
        confluence_score: features.map_or(0.0, |f| f.confluence_score),
        candidates: Vec::new(),
        degraded_features: features.map(|f| f.degraded.clone()).unwrap_or_default(),
        failed_detectors: Vec::new(),
        elapsed_micros: 0,
    }
}

/// Evaluate one detector behind a panic fence and stamp its identity
fn run_detector(
    detector: &dyn PatternDetector,
    ctx: &PatternContext,
) -> std::result::Result<Option<CandidateSignal>, DetectorError> {
    let proposed = isolate(|| {
        if detector.should_run(ctx) {
            detector.evaluate(ctx)
        } else {
            Ok(None)
        }
    })
    .unwrap_or_else(|msg| Err(DetectorError::Panicked(msg)))?;

    let Some(mut candidate) = proposed else {
        return Ok(None);
    };
    candidate.confidence = checked_confidence(candidate.confidence)?;
    candidate.strategy = detector.name().to_string();
    candidate.kind = CandidateKind::Pattern;
    candidate.affinity = detector.affinity();
    Ok(Some(candidate))
}

fn run_strategy(
    strategy: &dyn RegimeStrategy,
    ctx: &PatternContext,
) -> std::result::Result<Option<CandidateSignal>, DetectorError> {
    let proposed = isolate(|| strategy.evaluate(ctx))
        .unwrap_or_else(|msg| Err(DetectorError::Panicked(msg)))?;

    let Some(mut candidate) = proposed else {
        return Ok(None);
    };
    candidate.confidence = checked_confidence(candidate.confidence)?;
    candidate.strategy = strategy.name().to_string();
    candidate.kind = strategy.kind();
    Ok(Some(candidate))
}

fn checked_confidence(confidence: f64) -> std::result::Result<f64, DetectorError> {
    if confidence.is_finite() {
        Ok(clamp01(confidence))
    } else {
        Err(DetectorError::InvalidSignal(format!(
            "confidence {confidence} is not finite"
        )))
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("patterns", &self.patterns)
            .field("trend", &self.trend.as_ref().map(|s| s.name().to_string()))
            .field("range", &self.range.as_ref().map(|s| s.name().to_string()))
            .finish_non_exhaustive()
    }
}
