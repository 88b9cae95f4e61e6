//! Weighted confluence score and quality tiers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::names::FeatureName;
use crate::common::errors::{EngineError, Result};
use crate::common::math::clamp01;

/// Tolerance on the weight sum
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Per-feature weights; fixed at configuration time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureWeights(BTreeMap<FeatureName, f64>);

impl FeatureWeights {
    /// Build from an explicit table without validating it
    pub fn from_map(weights: BTreeMap<FeatureName, f64>) -> Self {
        Self(weights)
    }

    pub fn get(&self, name: FeatureName) -> f64 {
        self.0.get(&name).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureName, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Every feature present, every weight finite and non-negative, sum 1.0
    pub fn validate(&self) -> Result<()> {
        for name in FeatureName::ALL {
            let weight = self
                .0
                .get(&name)
                .copied()
                .ok_or(EngineError::MissingWeight(name))?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(EngineError::InvalidWeight {
                    feature: name,
                    weight,
                });
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidWeights { sum });
        }
        Ok(())
    }
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            (FeatureName::GammaProximity, 0.20),
            (FeatureName::VolumeConfirmation, 0.15),
            (FeatureName::TrendSlope, 0.15),
            (FeatureName::PatternStrength, 0.15),
            (FeatureName::RegimeStructure, 0.10),
            (FeatureName::OptionsFlowBias, 0.08),
            (FeatureName::CrossSymbolCorrelation, 0.07),
            (FeatureName::LevelProximity, 0.05),
            (FeatureName::SessionContext, 0.03),
            (FeatureName::PullbackQuality, 0.02),
        ]))
    }
}

/// Dot product of clamped feature values and their weights.
///
/// Features absent from `values` contribute their neutral value. With valid
/// weights the result lies in [0, 1] and never decreases when a single
/// feature value increases.
pub fn confluence_score(weights: &FeatureWeights, values: &BTreeMap<FeatureName, f64>) -> f64 {
    let raw: f64 = FeatureName::ALL
        .iter()
        .map(|name| {
            let value = values.get(name).copied().unwrap_or_else(|| name.neutral());
            weights.get(*name) * clamp01(value)
        })
        .sum();
    clamp01(raw)
}

/// Coarse quality bucket for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    NoTrade,
    Weak,
    Strong,
    Premium,
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::NoTrade => write!(f, "no_trade"),
            QualityTier::Weak => write!(f, "weak"),
            QualityTier::Strong => write!(f, "strong"),
            QualityTier::Premium => write!(f, "premium"),
        }
    }
}

/// Lower cutoffs of the tradeable tiers; anything below `weak` is no-trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    #[serde(default = "default_weak")]
    pub weak: f64,
    #[serde(default = "default_strong")]
    pub strong: f64,
    #[serde(default = "default_premium")]
    pub premium: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            weak: default_weak(),
            strong: default_strong(),
            premium: default_premium(),
        }
    }
}

fn default_weak() -> f64 {
    0.60
}

fn default_strong() -> f64 {
    0.70
}

fn default_premium() -> f64 {
    0.85
}

impl QualityThresholds {
    pub fn tier_for(&self, score: f64) -> QualityTier {
        if score >= self.premium {
            QualityTier::Premium
        } else if score >= self.strong {
            QualityTier::Strong
        } else if score >= self.weak {
            QualityTier::Weak
        } else {
            QualityTier::NoTrade
        }
    }

    /// 0 < weak < strong < premium <= 1
    pub fn validate(&self) -> Result<()> {
        let ascending = 0.0 < self.weak && self.weak < self.strong && self.strong < self.premium;
        if !ascending || self.premium > 1.0 {
            return Err(EngineError::InvalidThresholds(format!(
                "weak={} strong={} premium={}",
                self.weak, self.strong, self.premium
            )));
        }
        Ok(())
    }
}

/// Position-size multiplier per tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierMultipliers {
    #[serde(default = "default_premium_multiplier")]
    pub premium: f64,
    #[serde(default = "default_strong_multiplier")]
    pub strong: f64,
    #[serde(default = "default_weak_multiplier")]
    pub weak: f64,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            premium: default_premium_multiplier(),
            strong: default_strong_multiplier(),
            weak: default_weak_multiplier(),
        }
    }
}

fn default_premium_multiplier() -> f64 {
    1.5
}

fn default_strong_multiplier() -> f64 {
    1.0
}

fn default_weak_multiplier() -> f64 {
    0.5
}

impl TierMultipliers {
    pub fn for_tier(&self, tier: QualityTier) -> f64 {
        match tier {
            QualityTier::Premium => self.premium,
            QualityTier::Strong => self.strong,
            QualityTier::Weak => self.weak,
            QualityTier::NoTrade => 0.0,
        }
    }
}
