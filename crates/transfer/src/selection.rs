//! Transferable feature selection
//!
//! Ranks candidate features by how consistently important they are in a
//! data-rich source domain and a sparse target domain. Importance in each
//! domain is bootstrap permutation importance. When the target has too
//! few labelled rows the selector falls back to source importance alone
//! and says so in `mode`.

use opencarbon_ensemble::{derive_keyed_seed, BaggedForest, ForestConfig, Regressor};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::config::{SelectionConfig, TransferConfig};
use crate::errors::{Result, TransferError};
use crate::importance::{bootstrap_importance, BootstrapPlan, ImportanceSummary, RunSummary};
use crate::sample::SampleSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Scores combine source and target importance
    Transfer,
    /// Target too small; scores are source importance only
    SourceOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature_name: String,
    pub source_importance: ImportanceSummary,
    pub target_importance: Option<ImportanceSummary>,
    /// Geometric mean of the clamped source and target importances
    pub transfer_score: Option<f64>,
    /// `1 - |s - t| / (s + t + epsilon)`
    pub consistency: Option<f64>,
    pub final_score: f64,
    /// 1-based
    pub rank: usize,
    pub mode: SelectionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelection {
    /// Top-ranked feature names, best first
    pub features: Vec<String>,
    /// Every candidate, ranked
    pub scores: Vec<FeatureScore>,
    pub mode: SelectionMode,
    pub source_n: usize,
    pub target_n: usize,
    pub source_runs: RunSummary,
    pub target_runs: Option<RunSummary>,
}

impl FeatureSelection {
    pub fn score(&self, feature_name: &str) -> Option<&FeatureScore> {
        self.scores.iter().find(|s| s.feature_name == feature_name)
    }
}

pub struct TransferableFeatureSelector {
    config: SelectionConfig,
    forest: ForestConfig,
    seed: u64,
    max_failure_fraction: f64,
}

impl TransferableFeatureSelector {
    /// Fails with `Configuration` when `config` does not validate.
    pub fn new(config: &TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.selection.clone(),
            forest: config.forest.clone(),
            seed: config.seed,
            max_failure_fraction: config.execution.max_failure_fraction,
        })
    }

    /// Rank `candidates` with bagged forests built from the configured
    /// forest settings.
    pub fn select(
        &self,
        source: &SampleSet,
        target: &SampleSet,
        candidates: &[String],
        target_column: &str,
    ) -> Result<FeatureSelection> {
        let forest = self.forest.clone();
        self.select_with(source, target, candidates, target_column, || {
            BaggedForest::new(forest.clone())
        })
    }

    /// Rank `candidates` with models from `factory`.
    ///
    /// Source and target bootstraps draw from independent keyed seeds, so
    /// the source scores are the same whichever mode the run ends in.
    pub fn select_with<M, F>(
        &self,
        source: &SampleSet,
        target: &SampleSet,
        candidates: &[String],
        target_column: &str,
        factory: F,
    ) -> Result<FeatureSelection>
    where
        M: Regressor,
        F: Fn() -> M + Sync,
    {
        self.check_candidates(candidates)?;
        target.schema().require_features(candidates)?;
        target.schema().require_target(target_column)?;

        let source_n = source.complete_case_count(candidates, target_column);
        if source_n < self.config.min_source_samples {
            return Err(TransferError::InsufficientData(format!(
                "source domain has {source_n} complete rows, {} required",
                self.config.min_source_samples
            )));
        }
        let source_matrix = source.design_matrix(candidates, target_column)?;
        let source_estimate = bootstrap_importance(
            &source_matrix.data,
            self.plan("source", derive_keyed_seed(self.seed, "source")),
            &factory,
        )?;

        let target_n = target.complete_case_count(candidates, target_column);
        let target_estimate = if target_n >= self.config.min_target_samples {
            let target_matrix = target.design_matrix(candidates, target_column)?;
            Some(bootstrap_importance(
                &target_matrix.data,
                self.plan("target", derive_keyed_seed(self.seed, "target")),
                &factory,
            )?)
        } else {
            warn!(
                target_n,
                required = self.config.min_target_samples,
                "target domain too small, ranking on source importance only"
            );
            None
        };

        let mode = if target_estimate.is_some() {
            SelectionMode::Transfer
        } else {
            SelectionMode::SourceOnly
        };

        let mut scores: Vec<FeatureScore> = candidates
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let source_importance = source_estimate.features[j];
                let target_importance = target_estimate.as_ref().map(|t| t.features[j]);
                self.score_feature(name, source_importance, target_importance, mode)
            })
            .collect();

        scores.sort_by(|a, b| compare_by_score(a, b));
        for (idx, score) in scores.iter_mut().enumerate() {
            score.rank = idx + 1;
        }

        let keep = self.config.top_n.min(scores.len());
        let features: Vec<String> = scores[..keep]
            .iter()
            .map(|s| s.feature_name.clone())
            .collect();

        info!(
            ?mode,
            source_n,
            target_n,
            selected = features.len(),
            candidates = candidates.len(),
            "transferable features selected"
        );

        Ok(FeatureSelection {
            features,
            scores,
            mode,
            source_n,
            target_n,
            source_runs: source_estimate.runs,
            target_runs: target_estimate.map(|t| t.runs),
        })
    }

    fn check_candidates(&self, candidates: &[String]) -> Result<()> {
        if candidates.is_empty() {
            return Err(TransferError::Configuration(
                "no candidate features given".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = candidates.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(TransferError::Configuration(format!(
                "candidate feature '{dup}' listed twice"
            )));
        }
        Ok(())
    }

    fn plan<'a>(&self, label: &'a str, seed: u64) -> BootstrapPlan<'a> {
        BootstrapPlan {
            label,
            rounds: self.config.bootstrap_rounds,
            permutation_repeats: self.config.permutation_repeats,
            seed,
            max_failure_fraction: self.max_failure_fraction,
        }
    }

    fn score_feature(
        &self,
        name: &str,
        source_importance: ImportanceSummary,
        target_importance: Option<ImportanceSummary>,
        mode: SelectionMode,
    ) -> FeatureScore {
        let (transfer_score, consistency, final_score) = match target_importance {
            Some(target) => {
                // Negative importance means permuting helped; treat as zero.
                let s = source_importance.mean.max(0.0);
                let t = target.mean.max(0.0);
                let transfer = (s * t).sqrt();
                let consistency = 1.0 - (s - t).abs() / (s + t + self.config.epsilon);
                (Some(transfer), Some(consistency), transfer * consistency)
            }
            None => (None, None, source_importance.mean),
        };

        FeatureScore {
            feature_name: name.to_string(),
            source_importance,
            target_importance,
            transfer_score,
            consistency,
            final_score,
            rank: 0,
            mode,
        }
    }
}

/// Descending final score; ties by name.
fn compare_by_score(a: &FeatureScore, b: &FeatureScore) -> Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| a.feature_name.cmp(&b.feature_name))
}
