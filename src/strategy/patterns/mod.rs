//! Pattern detector registry
//!
//! Detectors are registered by name and evaluated in registration order.
//! The order matters: it breaks score ties during arbitration.

mod gamma;
mod intermarket;
mod orderflow;
mod profile;

pub use gamma::{DealerFlipBreakout, GammaPinReversion, OpeningDriveFail};
pub use intermarket::EsNqLeadLagMirror;
pub use orderflow::{
    CvdDivergenceTrap, IcebergTrackerFollow, LiquiditySweepReversal,
    StackedImbalanceContinuation,
};
pub use profile::{ProfileGapFill, VwapBandSqueezeBreak};

use crate::common::errors::{EngineError, Result};
use crate::config::types::DetectorConfig;
use crate::strategy::traits::{BoxedDetector, PatternDetector};

#[derive(Default)]
pub struct PatternRegistry {
    detectors: Vec<BoxedDetector>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All ten production detectors with their configured parameters
    pub fn standard(config: &DetectorConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(GammaPinReversion::new(config.gamma_pin_reversion.clone())))?;
        registry.register(Box::new(DealerFlipBreakout::new(config.dealer_flip_breakout.clone())))?;
        registry.register(Box::new(LiquiditySweepReversal::new(
            config.liquidity_sweep_reversal.clone(),
        )))?;
        registry.register(Box::new(StackedImbalanceContinuation::new(
            config.stacked_imbalance_continuation.clone(),
        )))?;
        registry.register(Box::new(IcebergTrackerFollow::new(
            config.iceberg_tracker_follow.clone(),
        )))?;
        registry.register(Box::new(CvdDivergenceTrap::new(config.cvd_divergence_trap.clone())))?;
        registry.register(Box::new(OpeningDriveFail::new(config.opening_drive_fail.clone())))?;
        registry.register(Box::new(EsNqLeadLagMirror::new(config.es_nq_lead_lag_mirror.clone())))?;
        registry.register(Box::new(VwapBandSqueezeBreak::new(
            config.vwap_band_squeeze_break.clone(),
        )))?;
        registry.register(Box::new(ProfileGapFill::new(config.profile_gap_fill.clone())))?;
        Ok(registry)
    }

    /// Add a detector; names must be unique
    pub fn register(&mut self, detector: BoxedDetector) -> Result<()> {
        if self.detectors.iter().any(|d| d.name() == detector.name()) {
            return Err(EngineError::DuplicateDetector(detector.name().to_string()));
        }
        self.detectors.push(detector);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.detectors.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn PatternDetector> {
        self.detectors.iter().map(|d| d.as_ref())
    }
}

impl std::fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternRegistry")
            .field("detectors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::BaseDetectorConfig;

    #[test]
    fn test_standard_registry_has_ten_unique_detectors() {
        let registry = PatternRegistry::standard(&DetectorConfig::default()).unwrap();
        assert_eq!(registry.len(), 10);

        let mut names = registry.names();
        assert_eq!(names[0], "gamma_pin_reversion");
        assert_eq!(names[9], "profile_gap_fill");
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PatternRegistry::new();
        assert!(registry.is_empty());
        registry
            .register(Box::new(ProfileGapFill::new(BaseDetectorConfig::default())))
            .unwrap();
        let err = registry
            .register(Box::new(ProfileGapFill::new(BaseDetectorConfig::default())))
            .unwrap_err();
        assert_eq!(err, EngineError::DuplicateDetector("profile_gap_fill".to_string()));
        assert_eq!(registry.len(), 1);
    }
}
