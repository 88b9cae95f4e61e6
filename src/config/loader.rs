//! Configuration loader

use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

use super::types::EngineConfig;
use crate::common::errors::{EngineError, Result};

/// Load and validate configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with CONFLUENCE__, nested with __)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<EngineConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            debug!(path, "loading configuration file");
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("CONFLUENCE")
            .separator("__")
            .try_parsing(true),
    );

    finish(builder)
}

/// Load and validate configuration from a TOML document
pub fn load_from_toml_str(contents: &str) -> Result<EngineConfig> {
    finish(Config::builder().add_source(File::from_str(contents, FileFormat::Toml)))
}

fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<EngineConfig> {
    let config: EngineConfig = builder
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))?
        .try_deserialize()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureName;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = load_from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let toml = r#"
            [cooldown]
            default_seconds = 45

            [cooldown.overrides]
            profile_gap_fill = 120

            [features.cache.ttl_seconds]
            gamma_proximity = 10

            [detectors.stacked_imbalance_continuation]
            min_rows = 4
        "#;
        let config = load_from_toml_str(toml).unwrap();
        assert_eq!(config.cooldown.default_seconds, 45);
        assert_eq!(config.cooldown.overrides.get("profile_gap_fill"), Some(&120));
        assert_eq!(
            config.features.cache.ttl_seconds.get(&FeatureName::GammaProximity),
            Some(&10)
        );
        assert_eq!(config.detectors.stacked_imbalance_continuation.min_rows, 4);
    }

    #[test]
    fn test_bad_weights_are_fatal() {
        let toml = r#"
            [features.weights]
            trend_slope = 0.5
            pattern_strength = 0.5
            regime_structure = 0.5
            gamma_proximity = 0.0
            level_proximity = 0.0
            cross_symbol_correlation = 0.0
            volume_confirmation = 0.0
            options_flow_bias = 0.0
            session_context = 0.0
            pullback_quality = 0.0
        "#;
        let err = load_from_toml_str(toml).unwrap_err();
        assert!(matches!(err, EngineError::InvalidWeights { .. }));
    }

    #[test]
    fn test_descending_thresholds_are_fatal() {
        let toml = r#"
            [quality.thresholds]
            weak = 0.9
            strong = 0.7
            premium = 0.85
        "#;
        let err = load_from_toml_str(toml).unwrap_err();
        assert!(matches!(err, EngineError::InvalidThresholds(_)));
    }
}
