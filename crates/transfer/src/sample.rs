//! Sample data model and schema validation
//!
//! Samples arrive already harmonized. The schema is checked once, when a
//! `SampleSet` is built, so no component coerces or looks up columns
//! loosely afterwards.

use opencarbon_ensemble::TrainingSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::errors::{Result, TransferError};

/// One observed entity with location, covariates and targets.
///
/// Missing values are `None`; present values must be finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub entity_id: String,
    pub lon: f64,
    pub lat: f64,
    /// Equal-area projected coordinates (meters)
    pub projected_x: f64,
    pub projected_y: f64,
    pub features: BTreeMap<String, Option<f64>>,
    pub targets: BTreeMap<String, Option<f64>>,
}

impl Sample {
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied().flatten()
    }

    pub fn target(&self, name: &str) -> Option<f64> {
        self.targets.get(name).copied().flatten()
    }
}

/// Declared numeric feature and target columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub features: Vec<String>,
    pub targets: Vec<String>,
}

impl Schema {
    pub fn new<F, T>(features: F, targets: T) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            features: features.into_iter().map(Into::into).collect(),
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.targets.iter().any(|t| t == name)
    }

    /// Fail with a configuration error on the first undeclared feature.
    pub fn require_features(&self, names: &[String]) -> Result<()> {
        match names.iter().find(|name| !self.has_feature(name)) {
            Some(name) => Err(TransferError::Configuration(format!(
                "feature '{name}' is not declared in the schema"
            ))),
            None => Ok(()),
        }
    }

    pub fn require_target(&self, name: &str) -> Result<()> {
        if self.has_target(name) {
            Ok(())
        } else {
            Err(TransferError::Configuration(format!(
                "target '{name}' is not declared in the schema"
            )))
        }
    }
}

/// A validated, immutable collection of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    schema: Schema,
    samples: Vec<Sample>,
}

/// Complete-case numeric view of a `SampleSet` for one target.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub feature_names: Vec<String>,
    pub entity_ids: Vec<String>,
    /// Position of each row in the originating `SampleSet`
    pub sample_indices: Vec<usize>,
    pub data: TrainingSet,
}

fn check_value(entity_id: &str, column: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() => Err(TransferError::Configuration(format!(
            "sample '{entity_id}': column '{column}' holds non-finite value {v}"
        ))),
        _ => Ok(()),
    }
}

impl SampleSet {
    /// Validate samples against the schema.
    pub fn new(schema: Schema, samples: Vec<Sample>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(samples.len());

        for sample in &samples {
            if !seen.insert(sample.entity_id.as_str()) {
                return Err(TransferError::Configuration(format!(
                    "duplicate entity_id '{}'",
                    sample.entity_id
                )));
            }

            let coords = [sample.lon, sample.lat, sample.projected_x, sample.projected_y];
            if coords.iter().any(|c| !c.is_finite()) {
                return Err(TransferError::Configuration(format!(
                    "sample '{}' has non-finite coordinates",
                    sample.entity_id
                )));
            }

            for (name, &value) in &sample.features {
                if !schema.has_feature(name) {
                    return Err(TransferError::Configuration(format!(
                        "sample '{}': undeclared feature '{name}'",
                        sample.entity_id
                    )));
                }
                check_value(&sample.entity_id, name, value)?;
            }
            for (name, &value) in &sample.targets {
                if !schema.has_target(name) {
                    return Err(TransferError::Configuration(format!(
                        "sample '{}': undeclared target '{name}'",
                        sample.entity_id
                    )));
                }
                check_value(&sample.entity_id, name, value)?;
            }
        }

        Ok(Self { schema, samples })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Present values of one feature, missing entries dropped.
    pub fn feature_values(&self, name: &str) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.feature(name)).collect()
    }

    /// Number of rows usable for `target` with every listed feature present.
    pub fn complete_case_count(&self, features: &[String], target: &str) -> usize {
        self.samples
            .iter()
            .filter(|s| is_complete(s, features, target))
            .count()
    }

    /// Rows with the target and every requested feature present.
    ///
    /// Fails with `InsufficientData` when no row qualifies.
    pub fn design_matrix(&self, features: &[String], target: &str) -> Result<DesignMatrix> {
        self.schema.require_features(features)?;
        self.schema.require_target(target)?;

        let mut entity_ids = Vec::new();
        let mut sample_indices = Vec::new();
        let mut rows = Vec::new();
        let mut targets = Vec::new();

        for (idx, sample) in self.samples.iter().enumerate() {
            let Some(y) = sample.target(target) else {
                continue;
            };
            let row: Option<Vec<f64>> = features.iter().map(|f| sample.feature(f)).collect();
            let Some(row) = row else {
                continue;
            };
            entity_ids.push(sample.entity_id.clone());
            sample_indices.push(idx);
            rows.push(row);
            targets.push(y);
        }

        if rows.is_empty() {
            return Err(TransferError::InsufficientData(format!(
                "no complete rows for target '{target}'"
            )));
        }

        Ok(DesignMatrix {
            feature_names: features.to_vec(),
            entity_ids,
            sample_indices,
            data: TrainingSet::new(rows, targets)?,
        })
    }
}

fn is_complete(sample: &Sample, features: &[String], target: &str) -> bool {
    sample.target(target).is_some() && features.iter().all(|f| sample.feature(f).is_some())
}
