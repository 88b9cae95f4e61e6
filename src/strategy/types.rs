use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::{from_f64, Side};
use crate::features::{FeatureName, QualityTier};
use crate::regime::{DirectionalBias, Regime};

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Trend,
    Range,
    Pattern,
}

/// How a pattern relates to the prevailing regime, used for score bonuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternAffinity {
    Breakout,
    Reversion,
    Neutral,
}

/// A proposed trade from one strategy or detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub strategy: String,
    pub kind: CandidateKind,
    pub affinity: PatternAffinity,
    pub side: Side,
    /// Raw confidence in [0, 1]
    pub confidence: f64,
    pub entry: Option<Decimal>,
    pub stop: Option<Decimal>,
    #[serde(default)]
    pub targets: Vec<Decimal>,
    pub reason: String,
    #[serde(default)]
    pub diagnostics: serde_json::Value,
}

impl CandidateSignal {
    pub fn new(
        strategy: impl Into<String>,
        kind: CandidateKind,
        side: Side,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            kind,
            affinity: PatternAffinity::Neutral,
            side,
            confidence,
            entry: None,
            stop: None,
            targets: Vec::new(),
            reason: reason.into(),
            diagnostics: serde_json::Value::Null,
        }
    }

    /// A pattern candidate; name and affinity are stamped by the registry
    pub fn pattern(side: Side, confidence: f64, reason: impl Into<String>) -> Self {
        Self::new("", CandidateKind::Pattern, side, confidence, reason)
    }

    pub fn with_affinity(mut self, affinity: PatternAffinity) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_entry(mut self, price: Decimal) -> Self {
        self.entry = Some(price);
        self
    }

    pub fn with_stop(mut self, price: Decimal) -> Self {
        self.stop = Some(price);
        self
    }

    pub fn with_target(mut self, price: Decimal) -> Self {
        self.targets.push(price);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: serde_json::Value) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Entry, stop and one target at `reward_risk` times the risk, rounded to ticks
    pub fn with_bracket(self, entry: f64, stop: f64, reward_risk: f64, tick: f64) -> Self {
        let risk = entry - stop;
        let target = entry + risk * reward_risk;
        self.with_entry(round_to_tick(entry, tick))
            .with_stop(round_to_tick(stop, tick))
            .with_target(round_to_tick(target, tick))
    }
}

/// Nearest tick multiple as a Decimal price
pub fn round_to_tick(price: f64, tick: f64) -> Decimal {
    if tick > 0.0 {
        from_f64((price / tick).round() * tick)
    } else {
        from_f64(price)
    }
}

/// Why no trade was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoTradeReason {
    /// Regime forbids trading this tick
    BiasForbidden,
    /// Every candidate was filtered out, or none were proposed
    NoEligibleCandidates,
    /// The best candidate scored below the weak tier
    BelowQualityThreshold,
    /// The winner's stop is too far or its reward/risk too thin
    RiskRejected,
    /// The tick ran out of time before all detectors finished
    LatencyBudgetExceeded,
    /// The pipeline itself failed
    EngineFault,
}

impl std::fmt::Display for NoTradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NoTradeReason::BiasForbidden => "bias_forbidden",
            NoTradeReason::NoEligibleCandidates => "no_eligible_candidates",
            NoTradeReason::BelowQualityThreshold => "below_quality_threshold",
            NoTradeReason::RiskRejected => "risk_rejected",
            NoTradeReason::LatencyBudgetExceeded => "latency_budget_exceeded",
            NoTradeReason::EngineFault => "engine_fault",
        };
        f.write_str(name)
    }
}

/// The trade handed to execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedTrade {
    pub strategy: String,
    pub kind: CandidateKind,
    pub side: Side,
    pub entry: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub targets: Vec<Decimal>,
    pub reason: String,
}

impl SelectedTrade {
    pub fn from_candidate(candidate: &CandidateSignal) -> Self {
        Self {
            strategy: candidate.strategy.clone(),
            kind: candidate.kind,
            side: candidate.side,
            entry: candidate.entry,
            stop: candidate.stop,
            targets: candidate.targets.clone(),
            reason: candidate.reason.clone(),
        }
    }
}

/// Engine verdict for a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Verdict {
    /// Execute the selected trade
    Trade(SelectedTrade),
    /// Stand aside
    NoTrade { reason: NoTradeReason },
}

impl Verdict {
    pub fn no_trade(reason: NoTradeReason) -> Self {
        Self::NoTrade { reason }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, Self::Trade(_))
    }

    pub fn trade(&self) -> Option<&SelectedTrade> {
        match self {
            Self::Trade(trade) => Some(trade),
            Self::NoTrade { .. } => None,
        }
    }

    pub fn no_trade_reason(&self) -> Option<NoTradeReason> {
        match self {
            Self::Trade(_) => None,
            Self::NoTrade { reason } => Some(*reason),
        }
    }
}

/// What happened to a candidate during arbitration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOutcome {
    Selected,
    /// Scored but outranked
    Outscored,
    OpposesBias,
    BelowMinimumConfidence,
    CoolingDown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub candidate: CandidateSignal,
    /// Present for candidates that reached scoring
    pub score: Option<f64>,
    pub outcome: CandidateOutcome,
}

/// The single engine output per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub verdict: Verdict,
    pub tier: QualityTier,
    pub size_multiplier: f64,
    /// Winning candidate score, 0 when nothing was scored
    pub score: f64,
    pub regime: Regime,
    pub bias: DirectionalBias,
    pub confluence_score: f64,
    pub candidates: Vec<CandidateReport>,
    pub degraded_features: Vec<FeatureName>,
    pub failed_detectors: Vec<String>,
    pub elapsed_micros: u64,
}

impl TradingDecision {
    pub fn is_trade(&self) -> bool {
        self.verdict.is_trade()
    }

    pub fn selected(&self) -> Option<&CandidateReport> {
        self.candidates
            .iter()
            .find(|c| c.outcome == CandidateOutcome::Selected)
    }
}
