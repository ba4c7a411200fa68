//! Block cross-validation
//!
//! Folds come from a block-level `FoldAssignment`; each fold trains a
//! fresh model from the factory on the other folds and is scored on its
//! own samples. Folds run in parallel and are reported in fold order.

use opencarbon_ensemble::{score, unit_rng, Regressor};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TransferConfig;
use crate::errors::{check_failure_fraction, Result, SkipReason, TransferError};
use crate::partition::{FoldAssignment, SpatialPartition};
use crate::sample::{DesignMatrix, SampleSet};
use crate::stats::mean_sd;

/// Outcome of one held-out fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvFoldResult {
    pub fold_index: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub rmse: f64,
    pub mae: f64,
    /// Against the training-fold mean
    pub r2: f64,
    pub train_mean: f64,
    /// Share of test actuals inside the central prediction interval, when
    /// the model reports intervals
    pub interval_coverage: Option<f64>,
    pub entity_ids: Vec<String>,
    pub predictions: Vec<f64>,
    pub actuals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFold {
    pub fold_index: usize,
    pub n_train: usize,
    pub n_test: usize,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Mean / sd of fold scores over evaluated folds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub n_folds: usize,
    pub n_evaluated: usize,
    pub n_skipped: usize,
    pub rmse_mean: f64,
    pub rmse_sd: f64,
    pub mae_mean: f64,
    pub mae_sd: f64,
    pub r2_mean: f64,
    pub r2_sd: f64,
    pub interval_coverage_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub folds: Vec<CvFoldResult>,
    pub skipped: Vec<SkippedFold>,
    pub summary: CvSummary,
}

enum FoldOutcome {
    Evaluated(CvFoldResult),
    Skipped(SkippedFold),
}

pub struct BlockCrossValidator {
    seed: u64,
    interval: (f64, f64),
    max_failure_fraction: f64,
}

impl BlockCrossValidator {
    /// Fails with `Configuration` when `config` does not validate.
    pub fn new(config: &TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            seed: config.seed,
            interval: (config.quantiles.interval_lower, config.quantiles.interval_upper),
            max_failure_fraction: config.execution.max_failure_fraction,
        })
    }

    /// Cross-validate `factory`'s models on the complete rows of `samples`.
    ///
    /// Fold `k` is trained with a seed drawn from stream `seed + k`.
    pub fn evaluate<M, F>(
        &self,
        samples: &SampleSet,
        features: &[String],
        target: &str,
        partition: &SpatialPartition,
        assignment: &FoldAssignment,
        factory: F,
    ) -> Result<CrossValidationReport>
    where
        M: Regressor,
        F: Fn() -> M + Sync,
    {
        let matrix = samples.design_matrix(features, target)?;

        // Rows outside the partition have no fold and take no part.
        let mut rows = Vec::with_capacity(matrix.entity_ids.len());
        let mut row_folds = Vec::with_capacity(matrix.entity_ids.len());
        for (row, entity_id) in matrix.entity_ids.iter().enumerate() {
            if let Some(fold) = assignment.fold_of_entity(partition, entity_id) {
                rows.push(row);
                row_folds.push(fold);
            }
        }

        let n_folds = assignment.n_folds();
        let outcomes: Vec<FoldOutcome> = (0..n_folds)
            .into_par_iter()
            .map(|fold_index| {
                let (test, train): (Vec<(usize, usize)>, Vec<(usize, usize)>) = rows
                    .iter()
                    .copied()
                    .zip(row_folds.iter().copied())
                    .partition(|&(_, fold)| fold == fold_index);
                let test: Vec<usize> = test.into_iter().map(|(row, _)| row).collect();
                let train: Vec<usize> = train.into_iter().map(|(row, _)| row).collect();
                self.run_fold(fold_index, &matrix, &train, &test, &factory)
            })
            .collect();

        let mut folds = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                FoldOutcome::Evaluated(result) => folds.push(result),
                FoldOutcome::Skipped(skip) => skipped.push(skip),
            }
        }

        let failed = skipped
            .iter()
            .filter(|s| s.reason != SkipReason::SkippedEmptyFold)
            .count();
        check_failure_fraction("folds", failed, n_folds, self.max_failure_fraction)?;
        if folds.is_empty() {
            return Err(TransferError::InsufficientData(format!(
                "none of the {n_folds} folds could be evaluated"
            )));
        }

        let summary = summarize(n_folds, &folds, skipped.len());
        info!(
            target,
            n_folds,
            evaluated = summary.n_evaluated,
            skipped = summary.n_skipped,
            rmse = summary.rmse_mean,
            r2 = summary.r2_mean,
            "block cross-validation finished"
        );

        Ok(CrossValidationReport {
            folds,
            skipped,
            summary,
        })
    }

    fn run_fold<M, F>(
        &self,
        fold_index: usize,
        matrix: &DesignMatrix,
        train: &[usize],
        test: &[usize],
        factory: &F,
    ) -> FoldOutcome
    where
        M: Regressor,
        F: Fn() -> M + Sync,
    {
        let skip = |reason: SkipReason| {
            warn!(fold_index, n_train = train.len(), n_test = test.len(), ?reason, "fold skipped");
            FoldOutcome::Skipped(SkippedFold {
                fold_index,
                n_train: train.len(),
                n_test: test.len(),
                reason,
            })
        };

        if test.is_empty() {
            return skip(SkipReason::SkippedEmptyFold);
        }
        if train.is_empty() {
            return skip(SkipReason::InsufficientData {
                available: 0,
                required: 1,
            });
        }

        let fitted = matrix.data.subset(train).and_then(|train_set| {
            let mut model = factory();
            model.fit(&train_set, fold_seed(self.seed, fold_index))?;
            Ok((model, train_set.target_mean()))
        });
        let (model, train_mean) = match fitted {
            Ok(fitted) => fitted,
            Err(err) => return skip(SkipReason::training_failed(err)),
        };

        let test_rows: Vec<Vec<f64>> = test.iter().map(|&i| matrix.data.row(i).to_vec()).collect();
        let actuals: Vec<f64> = test.iter().map(|&i| matrix.data.targets()[i]).collect();
        let predictions = match model.predict(&test_rows) {
            Ok(p) => p,
            Err(err) => return skip(SkipReason::training_failed(err)),
        };

        let scores = score(&predictions, &actuals, train_mean);
        let (lower, upper) = self.interval;
        let covered: Option<Vec<bool>> = test_rows
            .iter()
            .zip(&actuals)
            .map(|(row, &actual)| {
                model
                    .predict_interval(row, lower, upper)
                    .map(|(lo, hi)| lo <= actual && actual <= hi)
            })
            .collect();
        let interval_coverage = covered
            .map(|c| c.iter().filter(|&&inside| inside).count() as f64 / c.len() as f64);

        FoldOutcome::Evaluated(CvFoldResult {
            fold_index,
            n_train: train.len(),
            n_test: test.len(),
            rmse: scores.rmse,
            mae: scores.mae,
            r2: scores.r2,
            train_mean,
            interval_coverage,
            entity_ids: test.iter().map(|&i| matrix.entity_ids[i].clone()).collect(),
            predictions,
            actuals,
        })
    }
}

/// Model seed of one fold.
///
/// Drawn from the fold's own stream rather than `seed + k`: forests seed
/// tree `t` with `seed + t`, so consecutive integer seeds would share
/// tree streams between folds.
pub(crate) fn fold_seed(seed: u64, fold_index: usize) -> u64 {
    unit_rng(seed, fold_index).gen()
}

fn summarize(n_folds: usize, folds: &[CvFoldResult], n_skipped: usize) -> CvSummary {
    let rmse: Vec<f64> = folds.iter().map(|f| f.rmse).collect();
    let mae: Vec<f64> = folds.iter().map(|f| f.mae).collect();
    let r2: Vec<f64> = folds.iter().map(|f| f.r2).collect();
    let coverage: Option<Vec<f64>> = folds.iter().map(|f| f.interval_coverage).collect();

    let (rmse_mean, rmse_sd) = mean_sd(&rmse);
    let (mae_mean, mae_sd) = mean_sd(&mae);
    let (r2_mean, r2_sd) = mean_sd(&r2);

    CvSummary {
        n_folds,
        n_evaluated: folds.len(),
        n_skipped,
        rmse_mean,
        rmse_sd,
        mae_mean,
        mae_sd,
        r2_mean,
        r2_sd,
        interval_coverage_mean: coverage.map(|c| mean_sd(&c).0),
    }
}
