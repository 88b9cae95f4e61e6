use crate::common::errors::DetectorError;
use crate::strategy::context::PatternContext;
use crate::strategy::types::{CandidateKind, CandidateSignal, PatternAffinity};

/// Independent pattern detector
///
/// Detectors see the same read-only [`PatternContext`] and propose at most
/// one candidate per tick. They never call each other and never block.
///
/// # Implementation Notes
///
/// - `evaluate` should be fast - no I/O, no sleeping
/// - Return `Ok(None)` when the pattern is simply absent
/// - Return `Err` only when the context cannot be evaluated; the engine
///   logs it and drops this detector for the tick
/// - Name and affinity on the returned candidate are overwritten by the
///   engine with [`name`](Self::name) and [`affinity`](Self::affinity)
///
/// # Example
///
/// ```ignore
/// struct DeltaBurst;
///
/// impl PatternDetector for DeltaBurst {
///     fn name(&self) -> &str { "delta_burst" }
///
///     fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError> {
///         if !ctx.order_flow.delta_burst {
///             return Ok(None);
///         }
///         Ok(ctx.side_vs_vwap().map(|side| CandidateSignal::pattern(side, 0.65, "burst")))
///     }
/// }
/// ```
pub trait PatternDetector: Send + Sync {
    /// Unique identifier, also the cooldown key
    fn name(&self) -> &str;

    fn affinity(&self) -> PatternAffinity {
        PatternAffinity::Neutral
    }

    /// Cheap pre-check; detectors that return false are not evaluated
    fn should_run(&self, _ctx: &PatternContext) -> bool {
        true
    }

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError>;
}

/// Boxed detector for dynamic dispatch
pub type BoxedDetector = Box<dyn PatternDetector>;

/// Regime-gated strategy (trend following or range fading)
///
/// The engine only evaluates a strategy whose [`kind`](Self::kind) matches
/// the current regime family.
pub trait RegimeStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// [`CandidateKind::Trend`] or [`CandidateKind::Range`]
    fn kind(&self) -> CandidateKind;

    fn evaluate(&self, ctx: &PatternContext) -> Result<Option<CandidateSignal>, DetectorError>;
}

pub type BoxedRegimeStrategy = Box<dyn RegimeStrategy>;
