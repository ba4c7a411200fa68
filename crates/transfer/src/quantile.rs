//! Quantile predictions from a bagged ensemble
//!
//! The spread of per-tree predictions stands in for predictive
//! uncertainty. Rows far from the training support get wider intervals;
//! that width is the extrapolation signal, reported as data.

use opencarbon_ensemble::{
    empirical_quantile, BaggedForest, EnsembleRegressor, QuantileValue, Regressor,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{QuantileConfig, TransferConfig};
use crate::errors::{Result, TransferError};
use crate::sample::{Sample, SampleSet};

/// Predictive distribution summary for one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantilePrediction {
    pub entity_id: String,
    /// Ascending by level; values non-decreasing
    pub quantiles: Vec<QuantileValue>,
    /// The median
    pub point_estimate: f64,
    pub interval_lower: f64,
    pub interval_upper: f64,
    pub interval_width: f64,
}

impl QuantilePrediction {
    pub fn quantile(&self, level: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|q| (q.level - level).abs() < 1e-12)
            .map(|q| q.value)
    }
}

/// A row whose interval is unusually wide relative to its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrapolationWarning {
    pub entity_id: String,
    pub interval_width: f64,
    pub reference_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPrediction {
    pub entity_id: String,
    pub missing_features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBatch {
    pub predictions: Vec<QuantilePrediction>,
    pub skipped: Vec<SkippedPrediction>,
}

/// Bagged forest exposing conditional quantiles.
#[derive(Debug, Clone)]
pub struct QuantileEnsembleModel {
    forest: BaggedForest,
    feature_names: Vec<String>,
    levels: Vec<f64>,
    config: QuantileConfig,
}

impl QuantileEnsembleModel {
    /// Fit `config.forest` on the complete rows of `samples`.
    pub fn fit(
        samples: &SampleSet,
        features: &[String],
        target: &str,
        config: &TransferConfig,
    ) -> Result<Self> {
        config.validate()?;
        let matrix = samples.design_matrix(features, target)?;
        let mut forest = BaggedForest::new(config.forest.clone());
        forest.fit(&matrix.data, config.seed)?;

        info!(
            target,
            n_samples = matrix.data.len(),
            n_features = features.len(),
            n_trees = forest.trees().len(),
            "quantile ensemble fitted"
        );

        Self::from_forest(forest, features.to_vec(), config.quantiles.clone())
    }

    /// Wrap an already fitted forest.
    pub fn from_forest(
        forest: BaggedForest,
        feature_names: Vec<String>,
        config: QuantileConfig,
    ) -> Result<Self> {
        config.validate()?;
        if !forest.is_fitted() {
            return Err(opencarbon_ensemble::EnsembleError::NotFitted.into());
        }
        if forest.feature_count() != feature_names.len() {
            return Err(TransferError::Configuration(format!(
                "forest expects {} features but {} names were given",
                forest.feature_count(),
                feature_names.len()
            )));
        }

        let mut levels = config.levels.clone();
        levels.extend([0.5, config.interval_lower, config.interval_upper]);
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup();

        Ok(Self {
            forest,
            feature_names,
            levels,
            config,
        })
    }

    pub fn forest(&self) -> &BaggedForest {
        &self.forest
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Reported levels: the configured ones plus the median and the
    /// interval bounds.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Quantiles of the per-tree predictions for one feature row.
    pub fn predict_row(&self, entity_id: &str, row: &[f64]) -> Result<QuantilePrediction> {
        let mut members = self.forest.member_predictions(row)?;
        members.sort_by(|a, b| a.total_cmp(b));

        let quantiles = self
            .levels
            .iter()
            .map(|&level| QuantileValue {
                level,
                value: empirical_quantile(&members, level),
            })
            .collect();
        let interval_lower = empirical_quantile(&members, self.config.interval_lower);
        let interval_upper = empirical_quantile(&members, self.config.interval_upper);

        Ok(QuantilePrediction {
            entity_id: entity_id.to_string(),
            quantiles,
            point_estimate: empirical_quantile(&members, 0.5),
            interval_lower,
            interval_upper,
            interval_width: interval_upper - interval_lower,
        })
    }

    /// Predict every sample; samples missing a model feature are listed in
    /// `skipped` instead of failing the batch.
    pub fn predict(&self, samples: &[Sample]) -> Result<PredictionBatch> {
        let mut predictions = Vec::with_capacity(samples.len());
        let mut skipped = Vec::new();

        for sample in samples {
            let missing: Vec<String> = self
                .feature_names
                .iter()
                .filter(|f| sample.feature(f).is_none())
                .cloned()
                .collect();
            if !missing.is_empty() {
                skipped.push(SkippedPrediction {
                    entity_id: sample.entity_id.clone(),
                    missing_features: missing,
                });
                continue;
            }

            let row: Vec<f64> = self
                .feature_names
                .iter()
                .filter_map(|f| sample.feature(f))
                .collect();
            predictions.push(self.predict_row(&sample.entity_id, &row)?);
        }

        debug!(
            predicted = predictions.len(),
            skipped = skipped.len(),
            "quantile batch predicted"
        );

        Ok(PredictionBatch {
            predictions,
            skipped,
        })
    }

    /// Flag predictions whose interval exceeds `extrapolation_factor` times
    /// the batch median width.
    pub fn extrapolation_warnings(
        &self,
        predictions: &[QuantilePrediction],
    ) -> Vec<ExtrapolationWarning> {
        if predictions.is_empty() {
            return Vec::new();
        }
        let mut widths: Vec<f64> = predictions.iter().map(|p| p.interval_width).collect();
        widths.sort_by(|a, b| a.total_cmp(b));
        let reference_width = empirical_quantile(&widths, 0.5);
        let limit = reference_width * self.config.extrapolation_factor;

        predictions
            .iter()
            .filter(|p| p.interval_width > limit)
            .map(|p| ExtrapolationWarning {
                entity_id: p.entity_id.clone(),
                interval_width: p.interval_width,
                reference_width,
            })
            .collect()
    }
}
