use serde::{Deserialize, Serialize};

/// The fixed feature set feeding the confluence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    TrendSlope,
    PatternStrength,
    RegimeStructure,
    GammaProximity,
    LevelProximity,
    CrossSymbolCorrelation,
    VolumeConfirmation,
    OptionsFlowBias,
    SessionContext,
    PullbackQuality,
}

impl FeatureName {
    pub const ALL: [FeatureName; 10] = [
        FeatureName::TrendSlope,
        FeatureName::PatternStrength,
        FeatureName::RegimeStructure,
        FeatureName::GammaProximity,
        FeatureName::LevelProximity,
        FeatureName::CrossSymbolCorrelation,
        FeatureName::VolumeConfirmation,
        FeatureName::OptionsFlowBias,
        FeatureName::SessionContext,
        FeatureName::PullbackQuality,
    ];

    /// Value substituted when the feature cannot be computed.
    ///
    /// Proximity and pattern features read absence as "no signal" (0.0);
    /// the rest fall back to the midpoint.
    pub fn neutral(self) -> f64 {
        match self {
            FeatureName::PatternStrength
            | FeatureName::GammaProximity
            | FeatureName::LevelProximity => 0.0,
            _ => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureName::TrendSlope => "trend_slope",
            FeatureName::PatternStrength => "pattern_strength",
            FeatureName::RegimeStructure => "regime_structure",
            FeatureName::GammaProximity => "gamma_proximity",
            FeatureName::LevelProximity => "level_proximity",
            FeatureName::CrossSymbolCorrelation => "cross_symbol_correlation",
            FeatureName::VolumeConfirmation => "volume_confirmation",
            FeatureName::OptionsFlowBias => "options_flow_bias",
            FeatureName::SessionContext => "session_context",
            FeatureName::PullbackQuality => "pullback_quality",
        }
    }
}

impl std::fmt::Display for FeatureName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_names_match_display() {
        for name in FeatureName::ALL {
            let json = serde_json::to_string(&name).unwrap();
            assert_eq!(json, format!("\"{}\"", name));
        }
    }

    #[test]
    fn test_neutral_values() {
        assert_eq!(FeatureName::GammaProximity.neutral(), 0.0);
        assert_eq!(FeatureName::VolumeConfirmation.neutral(), 0.5);
    }
}
