//! Confluence Engine Library
//!
//! Per-tick trading decisions for intraday futures: weighted feature
//! confluence, market regime classification and arbitration between
//! trend, range and pattern candidates.

pub mod common;
pub mod config;
pub mod engine;
pub mod features;
pub mod regime;
pub mod strategy;

// Re-export commonly used types
pub use common::errors::{DetectorError, EngineError, FeatureError, Result};
pub use common::timing::{LatencyStats, TickBudget};
pub use common::types::{Bar, LevelKind, LevelMap, MarketContext, OrderFlow, SessionPhase, Side};
pub use config::types::EngineConfig;
pub use engine::{DecisionEngine, EngineBuilder, EngineStatsSnapshot};
pub use features::{FeatureCalculator, FeatureName, FeatureResult, FeatureSource, QualityTier};
pub use regime::{DirectionalBias, MarketRegimeDetector, Regime, RegimeClassifier, RegimeResult};

// Strategy types
pub use strategy::{
    CandidateKind, CandidateOutcome, CandidateSignal, NoTradeReason, PatternAffinity,
    PatternContext, PatternDetector, PatternRegistry, RegimeStrategy, TradingDecision, Verdict,
};
