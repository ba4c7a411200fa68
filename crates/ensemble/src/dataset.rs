//! Dense numeric training data
//!
//! Rows are validated once at construction (rectangular, finite), so the
//! tree builder and the forest never re-check shapes.

use rand::Rng;

use crate::errors::{EnsembleError, Result};

/// Training dataset with floating-point features and targets
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingSet {
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
    feature_count: usize,
}

/// In-bag and out-of-bag row indices of one bootstrap draw.
#[derive(Clone, Debug)]
pub struct BootstrapDraw {
    pub in_bag: Vec<usize>,
    pub out_of_bag: Vec<usize>,
}

impl TrainingSet {
    /// Build a dataset, rejecting ragged rows and non-finite values.
    pub fn new(features: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self> {
        if features.is_empty() {
            return Err(EnsembleError::EmptyTrainingSet);
        }
        if features.len() != targets.len() {
            return Err(EnsembleError::InvalidParameters(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }

        let feature_count = features[0].len();
        for (row_idx, row) in features.iter().enumerate() {
            if row.len() != feature_count {
                return Err(EnsembleError::ShapeMismatch {
                    row: row_idx,
                    expected: feature_count,
                    actual: row.len(),
                });
            }
            if let Some(column) = row.iter().position(|v| !v.is_finite()) {
                return Err(EnsembleError::NonFinite { row: row_idx, column });
            }
        }
        if let Some(row) = targets.iter().position(|v| !v.is_finite()) {
            return Err(EnsembleError::NonFinite {
                row,
                column: feature_count,
            });
        }

        Ok(Self {
            features,
            targets,
            feature_count,
        })
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.features[idx]
    }

    /// Copy the given rows (duplicates allowed) into a new dataset.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.is_empty() {
            return Err(EnsembleError::EmptyTrainingSet);
        }
        let features = indices.iter().map(|&i| self.features[i].clone()).collect();
        let targets = indices.iter().map(|&i| self.targets[i]).collect();
        Ok(Self {
            features,
            targets,
            feature_count: self.feature_count,
        })
    }

    /// Draw `len()` rows with replacement.
    pub fn bootstrap<R: Rng + ?Sized>(&self, rng: &mut R) -> BootstrapDraw {
        let n = self.len();
        let mut drawn = vec![false; n];
        let in_bag: Vec<usize> = (0..n)
            .map(|_| {
                let idx = rng.gen_range(0..n);
                drawn[idx] = true;
                idx
            })
            .collect();
        let out_of_bag = (0..n).filter(|&i| !drawn[i]).collect();
        BootstrapDraw { in_bag, out_of_bag }
    }

    /// Mean of the targets
    pub fn target_mean(&self) -> f64 {
        self.targets.iter().sum::<f64>() / self.targets.len() as f64
    }

    /// (min, max) per feature column
    pub fn feature_ranges(&self) -> Vec<(f64, f64)> {
        let mut stats = vec![(f64::INFINITY, f64::NEG_INFINITY); self.feature_count];

        for row in &self.features {
            for (i, &val) in row.iter().enumerate() {
                stats[i].0 = stats[i].0.min(val);
                stats[i].1 = stats[i].1.max(val);
            }
        }

        stats
    }
}
