//! Permutation feature importance

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::dataset::TrainingSet;
use crate::errors::Result;
use crate::metrics::mean_squared_error;
use crate::regressor::Regressor;

/// Increase in mean squared error on `data` when each feature column is
/// shuffled, averaged over `repeats` shuffles.
///
/// Values near zero (or negative) mean the model does not rely on the
/// feature.
pub fn permutation_importance<M: Regressor + ?Sized>(
    model: &M,
    data: &TrainingSet,
    repeats: usize,
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    let repeats = repeats.max(1);
    let rows = data.features();
    let baseline = mean_squared_error(&model.predict(rows)?, data.targets());

    let mut importances = Vec::with_capacity(data.feature_count());
    let mut order: Vec<usize> = (0..data.len()).collect();
    let mut permuted = rows.to_vec();

    for feature_idx in 0..data.feature_count() {
        let mut total = 0.0;
        for _ in 0..repeats {
            order.shuffle(rng);
            for (row, &source) in permuted.iter_mut().zip(&order) {
                row[feature_idx] = rows[source][feature_idx];
            }
            total += mean_squared_error(&model.predict(&permuted)?, data.targets());
        }
        for (row, original) in permuted.iter_mut().zip(rows) {
            row[feature_idx] = original[feature_idx];
        }
        importances.push(total / repeats as f64 - baseline);
    }

    Ok(importances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EnsembleError;
    use rand::SeedableRng;

    /// Predicts the first feature and ignores the rest.
    struct FirstColumn;

    impl Regressor for FirstColumn {
        fn fit(&mut self, _data: &TrainingSet, _seed: u64) -> Result<()> {
            Ok(())
        }

        fn predict_row(&self, row: &[f64]) -> Result<f64> {
            row.first().copied().ok_or(EnsembleError::NotFitted)
        }
    }

    #[test]
    fn test_unused_feature_scores_zero() {
        let data = TrainingSet::new(
            (0..50).map(|i| vec![i as f64, (i * 7 % 13) as f64]).collect(),
            (0..50).map(|i| i as f64).collect(),
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let importance = permutation_importance(&FirstColumn, &data, 3, &mut rng).unwrap();

        assert!(importance[0] > 100.0);
        assert_eq!(importance[1], 0.0);
    }
}
