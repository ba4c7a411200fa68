//! Multi-task modelling over linked targets
//!
//! Related targets measured on the same entities (one per soil depth
//! layer, say) each get their own model. Their permutation importances
//! are averaged, unweighted by task size, into one consensus ranking.

use opencarbon_ensemble::{derive_keyed_seed, BaggedForest, Regressor};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

use crate::config::{MultiTaskConfig, TransferConfig};
use crate::errors::{check_failure_fraction, Result, SkipReason, TransferError};
use crate::importance::{bootstrap_importance, BootstrapPlan, ImportanceSummary, RunSummary};
use crate::quantile::QuantileEnsembleModel;
use crate::sample::{Sample, SampleSet, Schema};

/// One entity × task row of long-format input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedObservation {
    pub entity_id: String,
    pub task_id: String,
    pub lon: f64,
    pub lat: f64,
    pub projected_x: f64,
    pub projected_y: f64,
    pub features: BTreeMap<String, Option<f64>>,
    pub target: Option<f64>,
}

/// How feature values recorded on several task rows of one entity are
/// merged into the entity's single wide row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureReconciliation {
    /// Present values must agree exactly; a conflict is an error
    AssertInvariant,
    /// Keep the first present value in input order
    FirstObserved,
    /// Mean of the present values
    Average,
}

impl FeatureReconciliation {
    fn reconcile(self, entity_id: &str, feature: &str, values: &[f64]) -> Result<Option<f64>> {
        let Some(&first) = values.first() else {
            return Ok(None);
        };
        match self {
            FeatureReconciliation::FirstObserved => Ok(Some(first)),
            FeatureReconciliation::Average => {
                Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
            }
            FeatureReconciliation::AssertInvariant => {
                if let Some(other) = values.iter().find(|&&v| v != first) {
                    return Err(TransferError::Configuration(format!(
                        "entity '{entity_id}': feature '{feature}' differs across tasks ({first} vs {other})"
                    )));
                }
                Ok(Some(first))
            }
        }
    }
}

struct WideRow<'a> {
    first: &'a LinkedObservation,
    values: BTreeMap<&'a str, Vec<f64>>,
    targets: BTreeMap<String, Option<f64>>,
}

fn same_location(a: &LinkedObservation, b: &LinkedObservation) -> bool {
    a.lon == b.lon
        && a.lat == b.lat
        && a.projected_x == b.projected_x
        && a.projected_y == b.projected_y
}

/// Reshape long-format observations into one sample per entity with one
/// target column per task id.
///
/// Entities keep their first-appearance order. Every row of an entity must
/// carry the same coordinates, whatever the policy; a disagreement or a
/// repeated (entity, task) pair is rejected with `Configuration`.
pub fn reshape_linked(
    observations: &[LinkedObservation],
    features: &[String],
    policy: FeatureReconciliation,
) -> Result<SampleSet> {
    let mut order: Vec<&str> = Vec::new();
    let mut rows: HashMap<&str, WideRow<'_>> = HashMap::new();
    let mut tasks = BTreeSet::new();

    for obs in observations {
        let row = rows.entry(obs.entity_id.as_str()).or_insert_with(|| {
            order.push(obs.entity_id.as_str());
            WideRow {
                first: obs,
                values: BTreeMap::new(),
                targets: BTreeMap::new(),
            }
        });
        if !same_location(row.first, obs) {
            return Err(TransferError::Configuration(format!(
                "entity '{}': task '{}' row is located away from task '{}' row",
                obs.entity_id, obs.task_id, row.first.task_id
            )));
        }
        if row.targets.insert(obs.task_id.clone(), obs.target).is_some() {
            return Err(TransferError::Configuration(format!(
                "entity '{}' has more than one row for task '{}'",
                obs.entity_id, obs.task_id
            )));
        }
        tasks.insert(obs.task_id.clone());

        for (name, value) in &obs.features {
            if !features.contains(name) {
                return Err(TransferError::Configuration(format!(
                    "entity '{}': undeclared feature '{name}'",
                    obs.entity_id
                )));
            }
            if let Some(v) = value {
                row.values.entry(name.as_str()).or_default().push(*v);
            }
        }
    }

    let mut samples = Vec::with_capacity(order.len());
    for entity_id in order {
        let Some(row) = rows.remove(entity_id) else {
            continue;
        };
        let mut merged = BTreeMap::new();
        for name in features {
            let values = row.values.get(name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            merged.insert(name.clone(), policy.reconcile(entity_id, name, values)?);
        }
        samples.push(Sample {
            entity_id: entity_id.to_string(),
            lon: row.first.lon,
            lat: row.first.lat,
            projected_x: row.first.projected_x,
            projected_y: row.first.projected_y,
            features: merged,
            targets: row.targets,
        });
    }

    SampleSet::new(Schema::new(features.iter().cloned(), tasks), samples)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature_name: String,
    pub mean: f64,
    pub sd: f64,
}

/// A trained task: its model and its own importance estimate.
#[derive(Debug, Clone)]
pub struct TaskModel {
    pub task_id: String,
    pub n_samples: usize,
    pub importance: Vec<FeatureImportance>,
    pub runs: RunSummary,
    pub model: QuantileEnsembleModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTarget {
    pub task_id: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusFeature {
    pub feature_name: String,
    /// Unweighted mean of per-task mean importances
    pub importance: f64,
    pub n_tasks: usize,
    pub rank: usize,
}

#[derive(Debug, Clone)]
pub struct MultiTaskResult {
    pub tasks: Vec<TaskModel>,
    pub skipped_targets: Vec<SkippedTarget>,
    /// Ranked, best first
    pub consensus: Vec<ConsensusFeature>,
}

impl MultiTaskResult {
    pub fn task(&self, task_id: &str) -> Option<&TaskModel> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }
}

pub struct MultiTaskLinkedModeler {
    config: TransferConfig,
}

impl MultiTaskLinkedModeler {
    /// Fails with `Configuration` when `config` does not validate.
    pub fn new(config: &TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
        })
    }

    fn settings(&self) -> &MultiTaskConfig {
        &self.config.multitask
    }

    /// Reshape `observations` with `policy`, then fit every task id found.
    pub fn fit_linked(
        &self,
        observations: &[LinkedObservation],
        features: &[String],
        policy: FeatureReconciliation,
    ) -> Result<MultiTaskResult> {
        let samples = reshape_linked(observations, features, policy)?;
        let tasks = samples.schema().targets.clone();
        self.fit(&samples, features, &tasks)
    }

    /// Fit one model per task in `tasks` on the wide `samples`.
    ///
    /// Task seeds are keyed by task id, so a task's result does not
    /// depend on which other tasks are present.
    pub fn fit(
        &self,
        samples: &SampleSet,
        features: &[String],
        tasks: &[String],
    ) -> Result<MultiTaskResult> {
        if tasks.is_empty() {
            return Err(TransferError::Configuration("no tasks given".to_string()));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = tasks.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(TransferError::Configuration(format!(
                "task '{dup}' listed twice"
            )));
        }
        samples.schema().require_features(features)?;
        for task in tasks {
            samples.schema().require_target(task)?;
        }

        let outcomes: Vec<std::result::Result<TaskModel, SkippedTarget>> = tasks
            .par_iter()
            .map(|task_id| self.fit_task(samples, features, task_id))
            .collect();

        let mut trained = Vec::new();
        let mut skipped_targets = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(task) => trained.push(task),
                Err(skip) => {
                    warn!(task_id = %skip.task_id, reason = ?skip.reason, "task skipped");
                    skipped_targets.push(skip);
                }
            }
        }

        check_failure_fraction(
            "tasks",
            skipped_targets.len(),
            tasks.len(),
            self.config.execution.max_failure_fraction,
        )?;
        if trained.is_empty() {
            return Err(TransferError::InsufficientData(
                "no task could be trained".to_string(),
            ));
        }

        let consensus = consensus_ranking(features, &trained);
        info!(
            trained = trained.len(),
            skipped = skipped_targets.len(),
            "multi-task models fitted"
        );

        Ok(MultiTaskResult {
            tasks: trained,
            skipped_targets,
            consensus,
        })
    }

    fn fit_task(
        &self,
        samples: &SampleSet,
        features: &[String],
        task_id: &str,
    ) -> std::result::Result<TaskModel, SkippedTarget> {
        let skip = |reason| SkippedTarget {
            task_id: task_id.to_string(),
            reason,
        };

        let available = samples.complete_case_count(features, task_id);
        let required = self.settings().min_task_samples;
        if available < required {
            return Err(skip(SkipReason::InsufficientData { available, required }));
        }

        let seed = derive_keyed_seed(self.config.seed, task_id);
        let trained = samples.design_matrix(features, task_id).and_then(|matrix| {
            let factory = || BaggedForest::new(self.config.forest.clone());
            let estimate = bootstrap_importance(
                &matrix.data,
                BootstrapPlan {
                    label: task_id,
                    rounds: self.settings().bootstrap_rounds,
                    permutation_repeats: self.settings().permutation_repeats,
                    seed,
                    max_failure_fraction: self.config.execution.max_failure_fraction,
                },
                &factory,
            )?;

            let mut forest = factory();
            forest.fit(&matrix.data, model_seed(seed))?;
            let model =
                QuantileEnsembleModel::from_forest(forest, features.to_vec(), self.config.quantiles.clone())?;
            Ok((matrix.data.len(), estimate, model))
        });

        match trained {
            Ok((n_samples, estimate, model)) => Ok(TaskModel {
                task_id: task_id.to_string(),
                n_samples,
                importance: features
                    .iter()
                    .zip(estimate.features)
                    .map(|(name, ImportanceSummary { mean, sd })| FeatureImportance {
                        feature_name: name.clone(),
                        mean,
                        sd,
                    })
                    .collect(),
                runs: estimate.runs,
                model,
            }),
            Err(err) => Err(skip(SkipReason::training_failed(err))),
        }
    }
}

/// Seed of a task's final forest, kept apart from the bootstrap runs'
/// streams (`seed + run`) so tree `t` does not redraw run `t`'s rows.
pub(crate) fn model_seed(task_seed: u64) -> u64 {
    derive_keyed_seed(task_seed, "model")
}

/// Average per-task importances feature by feature and rank them.
fn consensus_ranking(features: &[String], tasks: &[TaskModel]) -> Vec<ConsensusFeature> {
    let mut consensus: Vec<ConsensusFeature> = features
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let total: f64 = tasks.iter().map(|t| t.importance[j].mean).sum();
            ConsensusFeature {
                feature_name: name.clone(),
                importance: total / tasks.len() as f64,
                n_tasks: tasks.len(),
                rank: 0,
            }
        })
        .collect();

    consensus.sort_by(|a, b| compare_by_importance(a, b));
    for (idx, feature) in consensus.iter_mut().enumerate() {
        feature.rank = idx + 1;
    }
    consensus
}

fn compare_by_importance(a: &ConsensusFeature, b: &ConsensusFeature) -> Ordering {
    b.importance
        .total_cmp(&a.importance)
        .then_with(|| a.feature_name.cmp(&b.feature_name))
}
