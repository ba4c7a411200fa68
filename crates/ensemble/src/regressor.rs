//! Pluggable regression contract
//!
//! Cross-validation and feature selection only need something that can be
//! fitted with a seed and asked for predictions. Ensembles additionally
//! expose their per-member predictions, from which quantiles follow.

use crate::dataset::TrainingSet;
use crate::errors::{EnsembleError, Result};
use crate::quantile::{quantiles, QuantileValue};

/// A trainable single-output regressor.
pub trait Regressor: Send + Sync {
    /// Fit on `data`. All randomness must derive from `seed`.
    fn fit(&mut self, data: &TrainingSet, seed: u64) -> Result<()>;

    /// Predict one row.
    fn predict_row(&self, row: &[f64]) -> Result<f64>;

    /// Predict every row of a dataset.
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }

    /// Central prediction interval between two quantile levels, when the
    /// model can express uncertainty.
    fn predict_interval(&self, _row: &[f64], _lower: f64, _upper: f64) -> Option<(f64, f64)> {
        None
    }
}

/// A regressor made of independently fitted members.
pub trait EnsembleRegressor: Regressor {
    /// One prediction per member, in member order.
    fn member_predictions(&self, row: &[f64]) -> Result<Vec<f64>>;

    /// Empirical quantiles of the member predictions.
    fn predict_quantiles(&self, row: &[f64], levels: &[f64]) -> Result<Vec<QuantileValue>> {
        let members = self.member_predictions(row)?;
        if members.is_empty() {
            return Err(EnsembleError::NotFitted);
        }
        Ok(quantiles(&members, levels))
    }
}
