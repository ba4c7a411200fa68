//! Error taxonomy for the transfer-learning core

use opencarbon_ensemble::EnsembleError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a whole analysis run
#[derive(Error, Debug)]
pub enum TransferError {
    /// Invalid parameters or schema violations; never retried
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Too few samples for a statistically meaningful fit
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Zero variance where an effect size is required
    #[error("degenerate distribution: {0}")]
    DegenerateDistribution(String),

    #[error("model error: {0}")]
    Ensemble(#[from] EnsembleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

/// Why a single unit (feature, fold, bootstrap run, task) produced no result.
///
/// Recorded next to the successful entries instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientData { available: usize, required: usize },
    SkippedEmptyFold,
    TrainingFailed { message: String },
}

impl SkipReason {
    pub fn training_failed(err: impl std::fmt::Display) -> Self {
        SkipReason::TrainingFailed {
            message: err.to_string(),
        }
    }
}

/// Fail with `InsufficientData` when too large a share of parallel units
/// failed.
pub(crate) fn check_failure_fraction(
    what: &str,
    failed: usize,
    total: usize,
    max_failure_fraction: f64,
) -> Result<()> {
    if total == 0 {
        return Ok(());
    }
    let fraction = failed as f64 / total as f64;
    if fraction > max_failure_fraction {
        tracing::warn!(what, failed, total, max_failure_fraction, "aborting evaluation");
        return Err(TransferError::InsufficientData(format!(
            "{failed} of {total} {what} failed (limit {:.0}%)",
            max_failure_fraction * 100.0
        )));
    }
    Ok(())
}
