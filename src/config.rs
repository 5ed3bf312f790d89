use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::ConfigError;

/// How nodes left over after the matching rounds are attached to aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Every node decides against a frozen copy of the assignments.
    /// Reproducible from run to run.
    Snapshot,
    /// Nodes read and write the live assignments. Avoids the copy, but the
    /// outcome can depend on scheduling.
    #[strum(to_string = "inplace", serialize = "in-place")]
    InPlace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Upper bound on matching rounds. Zero skips matching entirely.
    pub max_rounds: usize,
    /// Stop matching once fewer than this fraction of nodes are unaggregated.
    pub max_unassigned_ratio: f64,
    pub fallback: FallbackMode,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 15,
            max_unassigned_ratio: 0.05,
            fallback: FallbackMode::Snapshot,
        }
    }
}

impl AggregationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.max_unassigned_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::InvalidRatio(ratio));
        }
        Ok(())
    }

    pub fn is_deterministic(&self) -> bool {
        self.fallback == FallbackMode::Snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_fallback_mode_case_insensitively() {
        assert_eq!(
            FallbackMode::from_str("Snapshot").unwrap(),
            FallbackMode::Snapshot
        );
        assert_eq!(
            FallbackMode::from_str("INPLACE").unwrap(),
            FallbackMode::InPlace
        );
        assert_eq!(
            FallbackMode::from_str("in-place").unwrap(),
            FallbackMode::InPlace
        );
        assert!(FallbackMode::from_str("fast").is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: AggregationConfig =
            serde_json::from_str(r#"{ "max_rounds": 3, "fallback": "inplace" }"#).unwrap();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.max_unassigned_ratio, 0.05);
        assert_eq!(config.fallback, FallbackMode::InPlace);
        assert!(!config.is_deterministic());
    }

    #[test]
    fn rejects_bad_ratio() {
        let mut config = AggregationConfig::new();
        config.max_unassigned_ratio = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRatio(_))
        ));
        config.max_unassigned_ratio = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            AggregationConfig::from_json_file("does/not/exist.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
