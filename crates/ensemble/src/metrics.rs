//! Regression scores

use serde::{Deserialize, Serialize};

/// RMSE, MAE and R² of one prediction set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionScores {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

pub fn mean_squared_error(predictions: &[f64], actuals: &[f64]) -> f64 {
    if actuals.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(actuals)
        .map(|(p, a)| (p - a) * (p - a))
        .sum::<f64>()
        / actuals.len() as f64
}

/// Score predictions against actuals.
///
/// R² is measured against `reference_mean`, the mean a featureless model
/// would predict. Callers pass the training-set mean, not the mean of
/// `actuals`. A zero reference variance yields R² = 0.
pub fn score(predictions: &[f64], actuals: &[f64], reference_mean: f64) -> RegressionScores {
    let n = actuals.len();
    if n == 0 {
        return RegressionScores {
            rmse: 0.0,
            mae: 0.0,
            r2: 0.0,
        };
    }

    let sse: f64 = predictions
        .iter()
        .zip(actuals)
        .map(|(p, a)| (p - a) * (p - a))
        .sum();
    let sae: f64 = predictions.iter().zip(actuals).map(|(p, a)| (p - a).abs()).sum();
    let ss_ref: f64 = actuals
        .iter()
        .map(|a| (a - reference_mean) * (a - reference_mean))
        .sum();

    RegressionScores {
        rmse: (sse / n as f64).sqrt(),
        mae: sae / n as f64,
        r2: if ss_ref > 0.0 { 1.0 - sse / ss_ref } else { 0.0 },
    }
}
