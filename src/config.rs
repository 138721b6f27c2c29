use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Post-hoc rotation applied to the retained loadings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationMethod {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "varimax")]
    Varimax,
    #[serde(rename = "promax")]
    Promax,
}

impl RotationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RotationMethod::None => "",
            RotationMethod::Varimax => "varimax",
            RotationMethod::Promax => "promax",
        }
    }
}

impl fmt::Display for RotationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationMethod::None => write!(f, "none"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl FromStr for RotationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(RotationMethod::None),
            "varimax" => Ok(RotationMethod::Varimax),
            "promax" => Ok(RotationMethod::Promax),
            _ => Err(ConfigError::RotationMethod(s.to_string())),
        }
    }
}

/// Fixed configuration for one pipeline run.
///
/// Every stage is a pure function of its input plus these values; two runs
/// with the same table and the same config produce identical output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cumulative explained variance the retained components must reach.
    pub variance_threshold: f64,
    /// Expected fraction of anomalous rows.
    pub contamination: f64,
    pub rotation_method: RotationMethod,
    /// Minimum absolute loading for a component to count toward importance.
    pub min_significance: f64,
    /// Seed for every randomized stage.
    pub seed: u64,
    /// Trees in the isolation ensemble.
    pub n_estimators: usize,
    /// Upper bound on the rows drawn for each tree.
    pub max_samples: usize,
    /// Fewest retained components the decomposition may recommend.
    pub min_components: usize,
    /// Length of the presented importance ranking.
    pub top_n: usize,
    /// Variables listed per component in the diagnostic summary.
    pub vars_per_component: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 0.80,
            contamination: 0.05,
            rotation_method: RotationMethod::None,
            min_significance: 0.3,
            seed: 42,
            n_estimators: 100,
            max_samples: 256,
            min_components: 1,
            top_n: 20,
            vars_per_component: 6,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.variance_threshold > 0.0 && self.variance_threshold <= 1.0) {
            return Err(ConfigError::VarianceThreshold(self.variance_threshold));
        }
        if !(0.0..0.5).contains(&self.contamination) {
            return Err(ConfigError::Contamination(self.contamination));
        }
        if !(self.min_significance >= 0.0) {
            return Err(ConfigError::MinSignificance(self.min_significance));
        }
        if self.n_estimators == 0 {
            return Err(ConfigError::Zero {
                field: "n_estimators",
            });
        }
        if self.max_samples == 0 {
            return Err(ConfigError::Zero {
                field: "max_samples",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.variance_threshold, 0.80);
        assert_eq!(config.contamination, 0.05);
        assert_eq!(config.min_significance, 0.3);
        assert_eq!(config.rotation_method, RotationMethod::None);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = PipelineConfig {
            variance_threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VarianceThreshold(_))
        ));

        let config = PipelineConfig {
            contamination: 0.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Contamination(_))));

        let config = PipelineConfig {
            min_significance: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MinSignificance(_))
        ));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"rotation_method": "varimax", "seed": 7}"#).unwrap();
        assert_eq!(config.rotation_method, RotationMethod::Varimax);
        assert_eq!(config.seed, 7);
        assert_eq!(config.top_n, 20);

        let config: PipelineConfig = serde_json::from_str(r#"{"rotation_method": ""}"#).unwrap();
        assert_eq!(config.rotation_method, RotationMethod::None);
    }

    #[test]
    fn parses_rotation_names() {
        assert_eq!("".parse::<RotationMethod>().unwrap(), RotationMethod::None);
        assert_eq!(
            "Promax".parse::<RotationMethod>().unwrap(),
            RotationMethod::Promax
        );
        assert!("quartimax".parse::<RotationMethod>().is_err());
    }
}
