//! Error types for the engine

use thiserror::Error;

use crate::features::FeatureName;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Fatal errors raised while configuring or assembling the engine
///
/// Nothing in the per-tick decision path returns these: a running engine
/// always produces a decision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Feature weights do not sum to one
    #[error("Feature weights must sum to 1.0, got {sum}")]
    InvalidWeights { sum: f64 },

    /// A feature weight is negative or not finite
    #[error("Feature weight for {feature} must be a finite non-negative number, got {weight}")]
    InvalidWeight { feature: FeatureName, weight: f64 },

    /// A feature has no weight entry
    #[error("Missing weight for feature {0}")]
    MissingWeight(FeatureName),

    /// Quality tier cutoffs are not strictly ascending inside [0, 1]
    #[error("Quality thresholds must be strictly ascending within [0, 1]: {0}")]
    InvalidThresholds(String),

    /// Candidate scoring parameters are inconsistent
    #[error("Invalid scoring configuration: {0}")]
    InvalidScoring(String),

    /// Two detectors registered under the same name
    #[error("Duplicate pattern detector: {0}")]
    DuplicateDetector(String),
}

/// Why a single feature could not be computed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// A required input is absent from the snapshot
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    /// Not enough bars to compute the feature
    #[error("insufficient history: need {needed} bars, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    /// Computation produced NaN or infinity
    #[error("non-finite value")]
    NonFinite,

    /// Computation panicked
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Why a detector or strategy could not evaluate a context
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// A required input is absent from the context
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    /// Context values are inconsistent for this detector
    #[error("invalid context: {0}")]
    InvalidContext(String),

    /// The proposed candidate is unusable
    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    /// Evaluation panicked
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Run `f`, converting a panic into its message
///
/// Used to fence off individual features and detectors so that one failure
/// never takes down the tick.
pub fn isolate<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(|payload| {
        if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_passes_value_through() {
        assert_eq!(isolate(|| 41 + 1), Ok(42));
    }

    #[test]
    fn test_isolate_captures_panic_message() {
        let result: std::result::Result<(), String> = isolate(|| panic!("boom {}", 7));
        assert_eq!(result, Err("boom 7".to_string()));
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidWeights { sum: 0.9 };
        assert_eq!(err.to_string(), "Feature weights must sum to 1.0, got 0.9");

        let err = FeatureError::InsufficientHistory {
            needed: 10,
            available: 3,
        };
        assert_eq!(err.to_string(), "insufficient history: need 10 bars, have 3");
    }
}
