//! Feature calculation and confluence scoring
//!
//! Ten named features are computed independently per tick, each clamped to
//! [0, 1]. A feature that cannot be computed is replaced by its neutral value
//! and listed in [`FeatureResult::degraded`]. Slow-moving features are served
//! from a [`FeatureCache`] keyed by a digest of their own inputs.

pub mod cache;
pub mod calculator;
pub mod confluence;
mod names;

pub use cache::{CacheKey, CacheStats, FeatureCache};
pub use calculator::{FeatureCalculator, FeatureResult, FeatureSource};
pub use confluence::{
    confluence_score, FeatureWeights, QualityThresholds, QualityTier, TierMultipliers,
    WEIGHT_SUM_TOLERANCE,
};
pub use names::FeatureName;
