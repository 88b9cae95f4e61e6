//! Strategies and pattern detectors that propose trades
//!
//! Everything here is synchronous and side-effect free: a strategy or
//! detector looks at one [`PatternContext`] and returns at most one
//! [`CandidateSignal`]. Arbitration between candidates lives in the engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PER TICK (sync)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MarketContext + FeatureResult + RegimeResult               │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  PatternContext::build()  (shared, read-only)               │
//! │       │                                                     │
//! │       ├──► TrendStrategy     (trend regimes only)           │
//! │       ├──► RangeStrategy     (range regimes only)           │
//! │       └──► PatternRegistry   (every detector, in order)     │
//! │                 │                                           │
//! │                 ▼                                           │
//! │         Vec<CandidateSignal> → engine arbitration           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`PatternDetector`]: Trait for independent pattern detectors
//! - [`RegimeStrategy`]: Trait for the regime-gated trend and range strategies
//! - [`PatternRegistry`]: Ordered, uniquely-named set of detectors
//! - [`CandidateSignal`]: A proposed trade with confidence and bracket
//! - [`TradingDecision`]: The engine's single output per tick

mod context;
pub mod patterns;
mod range;
mod traits;
mod trend;
mod types;

pub use context::{GammaLevels, PatternContext, ValueArea, VwapBands, WallKind, WallProximity};
pub use patterns::PatternRegistry;
pub use range::RangeStrategy;
pub use traits::{BoxedDetector, BoxedRegimeStrategy, PatternDetector, RegimeStrategy};
pub use trend::TrendStrategy;
pub use types::{
    round_to_tick, CandidateKind, CandidateOutcome, CandidateReport, CandidateSignal,
    NoTradeReason, PatternAffinity, SelectedTrade, TradingDecision, Verdict,
};
