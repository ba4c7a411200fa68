//! Bootstrap permutation importance
//!
//! Shared by feature selection and multi-task modelling: `B` models are
//! fitted on bootstrap resamples of one domain, each scored by permutation
//! importance on the rows its resample left out.

use opencarbon_ensemble::{permutation_importance, unit_rng, Regressor, TrainingSet};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{check_failure_fraction, Result, TransferError};
use crate::stats::mean_sd;

/// Mean and sd of one feature's importance across bootstrap runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportanceSummary {
    pub mean: f64,
    pub sd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceEstimate {
    /// One entry per feature column
    pub features: Vec<ImportanceSummary>,
    pub runs: RunSummary,
}

/// Settings for one bootstrap importance pass.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapPlan<'a> {
    pub label: &'a str,
    pub rounds: usize,
    pub permutation_repeats: usize,
    pub seed: u64,
    pub max_failure_fraction: f64,
}

/// Run `plan.rounds` bootstrap fits in parallel.
///
/// Run `r` draws its resample from `seed + r`. Fails with
/// `InsufficientData` when more than `max_failure_fraction` of the runs
/// fail to fit.
pub fn bootstrap_importance<M, F>(
    data: &TrainingSet,
    plan: BootstrapPlan<'_>,
    factory: &F,
) -> Result<ImportanceEstimate>
where
    M: Regressor,
    F: Fn() -> M + Sync,
{
    if plan.rounds == 0 {
        return Err(TransferError::Configuration(format!(
            "{} bootstrap needs at least one round",
            plan.label
        )));
    }

    let runs: Vec<opencarbon_ensemble::Result<Vec<f64>>> = (0..plan.rounds)
        .into_par_iter()
        .map(|run| {
            let mut rng = unit_rng(plan.seed, run);
            let draw = data.bootstrap(&mut rng);
            let train = data.subset(&draw.in_bag)?;

            let mut model = factory();
            model.fit(&train, rng.gen())?;

            let eval = if draw.out_of_bag.len() >= 2 {
                data.subset(&draw.out_of_bag)?
            } else {
                data.clone()
            };
            permutation_importance(&model, &eval, plan.permutation_repeats, &mut rng)
        })
        .collect();

    let mut completed: Vec<Vec<f64>> = Vec::with_capacity(runs.len());
    let mut failed = 0;
    for (run, outcome) in runs.into_iter().enumerate() {
        match outcome {
            Ok(importances) => completed.push(importances),
            Err(err) => {
                warn!(domain = plan.label, run, error = %err, "bootstrap run failed");
                failed += 1;
            }
        }
    }
    check_failure_fraction(
        &format!("{} bootstrap runs", plan.label),
        failed,
        plan.rounds,
        plan.max_failure_fraction,
    )?;
    if completed.is_empty() {
        return Err(TransferError::InsufficientData(format!(
            "no {} bootstrap run completed",
            plan.label
        )));
    }

    let features = (0..data.feature_count())
        .map(|j| {
            let values: Vec<f64> = completed.iter().map(|run| run[j]).collect();
            let (mean, sd) = mean_sd(&values);
            ImportanceSummary { mean, sd }
        })
        .collect();

    debug!(
        domain = plan.label,
        completed = completed.len(),
        failed,
        "bootstrap importance estimated"
    );

    Ok(ImportanceEstimate {
        features,
        runs: RunSummary {
            completed: completed.len(),
            failed,
        },
    })
}
