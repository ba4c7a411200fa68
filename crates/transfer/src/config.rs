//! Analysis configuration
//!
//! A plain value object. It can be built in code, or read from TOML when
//! an orchestrating pipeline keeps its settings on disk.

use opencarbon_ensemble::ForestConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::errors::{Result, TransferError};

/// Top-level configuration for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Base seed; every parallel unit derives its own stream from it
    pub seed: u64,
    pub partition: PartitionConfig,
    pub forest: ForestConfig,
    pub quantiles: QuantileConfig,
    pub shift: ShiftConfig,
    pub selection: SelectionConfig,
    pub multitask: MultiTaskConfig,
    pub execution: ExecutionConfig,
}

/// Spatial blocking for cross-validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Block edge length in projected units (meters)
    pub block_size: f64,
    pub n_folds: usize,
}

/// Quantile levels reported per prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantileConfig {
    pub levels: Vec<f64>,
    pub interval_lower: f64,
    pub interval_upper: f64,
    /// Interval widths above this multiple of the batch median are flagged
    pub extrapolation_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiftConfig {
    /// Valid observations required per domain per feature
    pub min_observations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub top_n: usize,
    pub bootstrap_rounds: usize,
    pub min_source_samples: usize,
    pub min_target_samples: usize,
    pub permutation_repeats: usize,
    pub epsilon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiTaskConfig {
    pub min_task_samples: usize,
    pub bootstrap_rounds: usize,
    pub permutation_repeats: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Abort when more than this fraction of parallel units fail
    pub max_failure_fraction: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            partition: PartitionConfig::default(),
            forest: ForestConfig::default(),
            quantiles: QuantileConfig::default(),
            shift: ShiftConfig::default(),
            selection: SelectionConfig::default(),
            multitask: MultiTaskConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            block_size: 10_000.0,
            n_folds: 5,
        }
    }
}

impl Default for QuantileConfig {
    fn default() -> Self {
        Self {
            levels: vec![0.025, 0.05, 0.25, 0.5, 0.75, 0.95, 0.975],
            interval_lower: 0.025,
            interval_upper: 0.975,
            extrapolation_factor: 2.0,
        }
    }
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            min_observations: 10,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            bootstrap_rounds: 10,
            min_source_samples: 30,
            min_target_samples: 30,
            permutation_repeats: 1,
            epsilon: 1e-10,
        }
    }
}

impl Default for MultiTaskConfig {
    fn default() -> Self {
        Self {
            min_task_samples: 20,
            bootstrap_rounds: 10,
            permutation_repeats: 1,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_failure_fraction: 0.5,
        }
    }
}

fn invalid(message: impl Into<String>) -> TransferError {
    TransferError::Configuration(message.into())
}

fn is_open_unit(value: f64) -> bool {
    value > 0.0 && value < 1.0
}

impl QuantileConfig {
    /// Levels and interval bounds must lie strictly inside (0, 1).
    pub fn validate(&self) -> Result<()> {
        if let Some(level) = self.levels.iter().find(|&&q| !is_open_unit(q)) {
            return Err(invalid(format!("quantile level {level} is outside (0, 1)")));
        }
        if !is_open_unit(self.interval_lower)
            || !is_open_unit(self.interval_upper)
            || self.interval_lower >= self.interval_upper
        {
            return Err(invalid(format!(
                "interval bounds must satisfy 0 < lower < upper < 1, got {} and {}",
                self.interval_lower, self.interval_upper
            )));
        }
        if !(self.extrapolation_factor >= 1.0) {
            return Err(invalid("extrapolation_factor must be at least 1"));
        }
        Ok(())
    }
}

impl TransferConfig {
    /// Parse a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TransferConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| invalid(format!("failed to serialize config: {e}")))
    }

    /// Reject parameter combinations no component can run with.
    pub fn validate(&self) -> Result<()> {
        let partition = &self.partition;
        if !partition.block_size.is_finite() || partition.block_size <= 0.0 {
            return Err(invalid(format!(
                "block_size must be a positive finite length, got {}",
                partition.block_size
            )));
        }
        if partition.n_folds < 2 {
            return Err(invalid(format!(
                "n_folds must be at least 2, got {}",
                partition.n_folds
            )));
        }

        self.forest
            .validate()
            .map_err(|e| invalid(e.to_string()))?;

        self.quantiles.validate()?;

        let selection = &self.selection;
        if selection.top_n == 0 {
            return Err(invalid("top_n must be at least 1"));
        }
        if selection.bootstrap_rounds == 0 || self.multitask.bootstrap_rounds == 0 {
            return Err(invalid("bootstrap_rounds must be at least 1"));
        }
        if !(selection.epsilon > 0.0) {
            return Err(invalid("epsilon must be positive"));
        }

        let fraction = self.execution.max_failure_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(invalid(format!(
                "max_failure_fraction must lie in [0, 1], got {fraction}"
            )));
        }

        Ok(())
    }
}
