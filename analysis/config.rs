//! Run configuration, loaded from TOML.
//!
//! Every section is optional except `[data]`, which must name the target
//! column. Missing keys take the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::collinearity::AuxiliaryFit;
use crate::data::LoadOptions;
use crate::error::ErrorKind;
use crate::evaluate::FoldStrategy;
use crate::transform::{TransformScope, ZeroVariancePolicy};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read the configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse the configuration file as TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize the configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("The delimiter must be a single ASCII character, got {0:?}.")]
    InvalidDelimiter(char),

    #[error("No target column was configured. Set 'data.target' or pass --target.")]
    MissingTarget,

    #[error("Invalid value {value} for '{field}': expected {expected}.")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub null_values: Vec<String>,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PruneConfig {
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollinearityConfig {
    /// Features removed by name after the initial VIF report.
    pub drop: Vec<String>,
    /// When set, features are then removed one at a time while the highest
    /// VIF exceeds this value.
    pub threshold: Option<f64>,
    pub max_rounds: usize,
    /// Fit an intercept in the auxiliary regressions and use the centered R².
    pub intercept: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    pub variance_threshold: f64,
    pub zero_variance: ZeroVariancePolicy,
    pub scope: TransformScope,
    /// Keep the target column among the PCA inputs.
    pub retain_target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub ridge_alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationConfig {
    pub folds: usize,
    pub shuffle: bool,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub prune: PruneConfig,
    #[serde(default)]
    pub collinearity: CollinearityConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

fn default_delimiter() -> char {
    ','
}

impl Default for CollinearityConfig {
    fn default() -> Self {
        Self {
            drop: Vec::new(),
            threshold: None,
            max_rounds: 10,
            intercept: false,
        }
    }
}

impl CollinearityConfig {
    pub fn auxiliary_fit(&self) -> AuxiliaryFit {
        AuxiliaryFit::from_intercept(self.intercept)
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 0.95,
            zero_variance: ZeroVariancePolicy::default(),
            scope: TransformScope::default(),
            retain_target: false,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { ridge_alpha: 1.0 }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            shuffle: false,
            seed: 42,
        }
    }
}

impl EvaluationConfig {
    pub fn strategy(&self) -> FoldStrategy {
        if self.shuffle {
            FoldStrategy::Shuffled { seed: self.seed }
        } else {
            FoldStrategy::Contiguous
        }
    }
}

impl PipelineConfig {
    /// Default settings for predicting `target`.
    pub fn for_target(target: impl Into<String>) -> Self {
        Self {
            data: DataConfig {
                delimiter: default_delimiter(),
                null_values: Vec::new(),
                target: target.into(),
            },
            prune: PruneConfig::default(),
            collinearity: CollinearityConfig::default(),
            transform: TransformConfig::default(),
            split: SplitConfig::default(),
            model: ModelConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }

    /// Reads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            // Validated to be ASCII.
            delimiter: self.data.delimiter as u8,
            null_values: self.data.null_values.clone(),
        }
    }

    /// Checks every numeric setting against its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.data.delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter(self.data.delimiter));
        }
        if self.data.target.trim().is_empty() {
            return Err(ConfigError::MissingTarget);
        }

        if let Some(threshold) = self.collinearity.threshold {
            if !(threshold.is_finite() && threshold >= 1.0) {
                return Err(invalid(
                    "collinearity.threshold",
                    threshold,
                    "a finite number of at least 1",
                ));
            }
        }

        let variance = self.transform.variance_threshold;
        if !(variance > 0.0 && variance <= 1.0) {
            return Err(invalid("transform.variance_threshold", variance, "a value in (0, 1]"));
        }

        let fraction = self.split.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(invalid("split.test_fraction", fraction, "a value in (0, 1)"));
        }

        let alpha = self.model.ridge_alpha;
        if !(alpha.is_finite() && alpha >= 0.0) {
            return Err(invalid("model.ridge_alpha", alpha, "a finite, non-negative number"));
        }

        if self.evaluation.folds < 2 {
            return Err(invalid("evaluation.folds", self.evaluation.folds, "at least 2"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        value: value.to_string(),
        expected,
    }
}
