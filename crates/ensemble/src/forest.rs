//! Bagged regression forest
//!
//! Each tree is fitted on its own bootstrap resample with its own RNG
//! stream (`seed + tree_index`), so a forest is identical whatever the
//! number of worker threads.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cart::{CartBuilder, MaxFeatures, Tree, TreeConfig};
use crate::dataset::TrainingSet;
use crate::deterministic::unit_rng;
use crate::errors::{EnsembleError, Result};
use crate::quantile::empirical_quantile;
use crate::regressor::{EnsembleRegressor, Regressor};

/// Forest training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_samples_leaf: 5,
            max_features: MaxFeatures::Third,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(EnsembleError::InvalidParameters(
                "n_trees must be at least 1".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(EnsembleError::InvalidParameters(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if let MaxFeatures::Count(0) = self.max_features {
            return Err(EnsembleError::InvalidParameters(
                "max_features count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bagged ensemble of CART regression trees.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BaggedForest {
    config: ForestConfig,
    trees: Vec<Tree>,
    feature_count: usize,
}

impl BaggedForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_count: 0,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn check_row(&self, row: &[f64]) -> Result<()> {
        if !self.is_fitted() {
            return Err(EnsembleError::NotFitted);
        }
        if row.len() != self.feature_count {
            return Err(EnsembleError::ShapeMismatch {
                row: 0,
                expected: self.feature_count,
                actual: row.len(),
            });
        }
        Ok(())
    }
}

impl Regressor for BaggedForest {
    fn fit(&mut self, data: &TrainingSet, seed: u64) -> Result<()> {
        self.config.validate()?;
        if data.is_empty() {
            return Err(EnsembleError::EmptyTrainingSet);
        }

        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: self.config.max_features.resolve(data.feature_count()),
        };

        debug!(
            n_trees = self.config.n_trees,
            n_samples = data.len(),
            n_features = data.feature_count(),
            seed,
            "fitting bagged forest"
        );

        self.trees = (0..self.config.n_trees)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = unit_rng(seed, tree_idx);
                let draw = data.bootstrap(&mut rng);
                CartBuilder::new(data, tree_config.clone()).build(&draw.in_bag, &mut rng)
            })
            .collect();
        self.feature_count = data.feature_count();

        Ok(())
    }

    /// Mean of the member predictions
    fn predict_row(&self, row: &[f64]) -> Result<f64> {
        let members = self.member_predictions(row)?;
        Ok(members.iter().sum::<f64>() / members.len() as f64)
    }

    fn predict_interval(&self, row: &[f64], lower: f64, upper: f64) -> Option<(f64, f64)> {
        let mut members = self.member_predictions(row).ok()?;
        members.sort_by(|a, b| a.total_cmp(b));
        Some((
            empirical_quantile(&members, lower),
            empirical_quantile(&members, upper),
        ))
    }
}

impl EnsembleRegressor for BaggedForest {
    fn member_predictions(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_row(row)?;
        Ok(self.trees.iter().map(|tree| tree.predict(row)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_set(n: usize) -> TrainingSet {
        TrainingSet::new(
            (0..n).map(|i| vec![i as f64, ((i * 31) % 17) as f64]).collect(),
            (0..n).map(|i| 2.0 * i as f64).collect(),
        )
        .unwrap()
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_trees: 25,
            max_depth: 8,
            min_samples_leaf: 2,
            max_features: MaxFeatures::All,
        }
    }

    #[test]
    fn test_fit_and_predict() {
        let data = linear_set(60);
        let mut forest = BaggedForest::new(small_config());
        forest.fit(&data, 42).unwrap();

        assert_eq!(forest.trees().len(), 25);
        let pred = forest.predict_row(&[30.0, 5.0]).unwrap();
        assert!((pred - 60.0).abs() < 10.0, "prediction {pred}");
    }

    #[test]
    fn test_unfitted_forest_errors() {
        let forest = BaggedForest::new(small_config());
        assert_eq!(forest.predict_row(&[1.0, 2.0]).unwrap_err(), EnsembleError::NotFitted);
        assert!(forest.predict_interval(&[1.0, 2.0], 0.025, 0.975).is_none());
    }

    #[test]
    fn test_wrong_row_width_errors() {
        let mut forest = BaggedForest::new(small_config());
        forest.fit(&linear_set(20), 1).unwrap();
        assert!(matches!(
            forest.predict_row(&[1.0]),
            Err(EnsembleError::ShapeMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_determinism() {
        let data = linear_set(40);
        let mut a = BaggedForest::new(small_config());
        let mut b = BaggedForest::new(small_config());
        a.fit(&data, 7).unwrap();
        b.fit(&data, 7).unwrap();
        assert_eq!(a.trees(), b.trees());

        let mut c = BaggedForest::new(small_config());
        c.fit(&data, 8).unwrap();
        assert_ne!(a.trees(), c.trees());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut forest = BaggedForest::new(ForestConfig {
            n_trees: 0,
            ..small_config()
        });
        assert!(matches!(
            forest.fit(&linear_set(10), 1),
            Err(EnsembleError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_quantiles_ordered() {
        let mut forest = BaggedForest::new(small_config());
        forest.fit(&linear_set(50), 3).unwrap();
        let q = forest
            .predict_quantiles(&[25.0, 3.0], &[0.025, 0.5, 0.975])
            .unwrap();
        assert!(q[0].value <= q[1].value && q[1].value <= q[2].value);

        let (lo, hi) = forest.predict_interval(&[25.0, 3.0], 0.025, 0.975).unwrap();
        assert_eq!(lo, q[0].value);
        assert_eq!(hi, q[2].value);
    }
}
