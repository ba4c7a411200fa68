//! Per-feature covariate shift between a source and a target domain
//!
//! Reports Cohen's d (signed, target minus source) and a two-sample KS
//! test for each feature, largest absolute shift first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::config::ShiftConfig;
use crate::errors::{Result, SkipReason, TransferError};
use crate::sample::SampleSet;
use crate::stats::{cohens_d, ks_two_sample, mean, sample_sd};

/// Effect-size class of `|cohens_d|`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Negligible,
    Small,
    Medium,
    Large,
}

impl Severity {
    /// Thresholds 0.2 / 0.5 / 0.8 on `|d|`.
    pub fn from_effect_size(d: f64) -> Self {
        let d = d.abs();
        if d < 0.2 {
            Severity::Negligible
        } else if d < 0.5 {
            Severity::Small
        } else if d < 0.8 {
            Severity::Medium
        } else {
            Severity::Large
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Defined,
    /// Both domains have zero variance; no effect size exists
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftMetric {
    pub feature_name: String,
    pub source_n: usize,
    pub target_n: usize,
    pub source_mean: f64,
    pub source_sd: f64,
    pub target_mean: f64,
    pub target_sd: f64,
    pub cohens_d: Option<f64>,
    pub ks_statistic: f64,
    pub ks_pvalue: f64,
    pub severity: Option<Severity>,
    pub status: MetricStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFeature {
    pub feature_name: String,
    pub source_n: usize,
    pub target_n: usize,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftReport {
    /// Sorted by descending `|cohens_d|`; undefined metrics last
    pub metrics: Vec<ShiftMetric>,
    pub skipped: Vec<SkippedFeature>,
}

impl ShiftReport {
    pub fn metric(&self, feature_name: &str) -> Option<&ShiftMetric> {
        self.metrics.iter().find(|m| m.feature_name == feature_name)
    }

    /// Features at or above the given severity
    pub fn at_least(&self, severity: Severity) -> Vec<&ShiftMetric> {
        self.metrics
            .iter()
            .filter(|m| m.severity.map_or(false, |s| s as u8 >= severity as u8))
            .collect()
    }
}

pub struct DistributionShiftAnalyzer {
    config: ShiftConfig,
}

impl DistributionShiftAnalyzer {
    pub fn new(config: ShiftConfig) -> Self {
        Self { config }
    }

    /// Compare every listed feature between the two domains.
    pub fn analyze(
        &self,
        source: &SampleSet,
        target: &SampleSet,
        features: &[String],
    ) -> Result<ShiftReport> {
        source.schema().require_features(features)?;
        target.schema().require_features(features)?;

        let mut metrics = Vec::with_capacity(features.len());
        let mut skipped = Vec::new();

        for feature in features {
            let source_values = source.feature_values(feature);
            let target_values = target.feature_values(feature);
            match self.compare(feature, &source_values, &target_values) {
                Ok(metric) => metrics.push(metric),
                Err(reason) => {
                    warn!(feature = %feature, ?reason, "feature skipped in shift analysis");
                    skipped.push(SkippedFeature {
                        feature_name: feature.clone(),
                        source_n: source_values.len(),
                        target_n: target_values.len(),
                        reason,
                    });
                }
            }
        }

        metrics.sort_by(compare_by_shift);

        Ok(ShiftReport { metrics, skipped })
    }

    /// Compare two univariate samples with missing values already dropped.
    pub fn compare(
        &self,
        feature_name: &str,
        source_values: &[f64],
        target_values: &[f64],
    ) -> std::result::Result<ShiftMetric, SkipReason> {
        let required = self.config.min_observations;
        let available = source_values.len().min(target_values.len());
        if available < required {
            return Err(SkipReason::InsufficientData {
                available,
                required,
            });
        }

        let source_mean = mean(source_values);
        let source_sd = sample_sd(source_values);
        let target_mean = mean(target_values);
        let target_sd = sample_sd(target_values);
        let ks = ks_two_sample(source_values, target_values);

        let (d, status) = match cohens_d(source_mean, source_sd, target_mean, target_sd) {
            Ok(d) => (Some(d), MetricStatus::Defined),
            Err(TransferError::DegenerateDistribution(msg)) => {
                debug!(feature = feature_name, %msg, "effect size undefined");
                (None, MetricStatus::Undefined)
            }
            Err(_) => (None, MetricStatus::Undefined),
        };

        Ok(ShiftMetric {
            feature_name: feature_name.to_string(),
            source_n: source_values.len(),
            target_n: target_values.len(),
            source_mean,
            source_sd,
            target_mean,
            target_sd,
            cohens_d: d,
            ks_statistic: ks.statistic,
            ks_pvalue: ks.p_value,
            severity: d.map(Severity::from_effect_size),
            status,
        })
    }
}

fn compare_by_shift(a: &ShiftMetric, b: &ShiftMetric) -> Ordering {
    match (a.cohens_d, b.cohens_d) {
        (Some(da), Some(db)) => db.abs().total_cmp(&da.abs()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.feature_name.cmp(&b.feature_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Sample, Schema};
    use std::collections::BTreeMap;

    fn analyzer() -> DistributionShiftAnalyzer {
        DistributionShiftAnalyzer::new(ShiftConfig::default())
    }

    fn ramp(n: usize, offset: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 / n as f64 + offset).collect()
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(Severity::from_effect_size(0.19), Severity::Negligible);
        assert_eq!(Severity::from_effect_size(-0.2), Severity::Small);
        assert_eq!(Severity::from_effect_size(0.49), Severity::Small);
        assert_eq!(Severity::from_effect_size(0.5), Severity::Medium);
        assert_eq!(Severity::from_effect_size(-0.79), Severity::Medium);
        assert_eq!(Severity::from_effect_size(0.8), Severity::Large);
    }

    #[test]
    fn test_insufficient_data_is_flagged() {
        let err = analyzer().compare("ndvi", &ramp(9, 0.0), &ramp(50, 0.0)).unwrap_err();
        assert_eq!(
            err,
            SkipReason::InsufficientData {
                available: 9,
                required: 10
            }
        );
    }

    #[test]
    fn test_zero_variance_is_undefined() {
        let metric = analyzer().compare("flat", &[1.0; 12], &[1.0; 12]).unwrap();
        assert_eq!(metric.status, MetricStatus::Undefined);
        assert_eq!(metric.cohens_d, None);
        assert_eq!(metric.severity, None);
        assert_eq!(metric.ks_statistic, 0.0);
    }

    #[test]
    fn test_direction_and_symmetry() {
        let source = ramp(40, 0.0);
        let target = ramp(40, 0.2);
        let forward = analyzer().compare("x", &source, &target).unwrap();
        let backward = analyzer().compare("x", &target, &source).unwrap();

        assert!(forward.cohens_d.unwrap() > 0.0);
        assert!((forward.cohens_d.unwrap() + backward.cohens_d.unwrap()).abs() < 1e-12);
        assert_eq!(forward.ks_statistic, backward.ks_statistic);
    }

    #[test]
    fn test_ordering_largest_shift_first() {
        let small = analyzer().compare("small", &ramp(30, 0.0), &ramp(30, 0.05)).unwrap();
        let large = analyzer().compare("large", &ramp(30, 0.0), &ramp(30, -0.5)).unwrap();
        let flat = analyzer().compare("flat", &[2.0; 30], &[2.0; 30]).unwrap();

        let mut metrics = vec![flat, small, large];
        metrics.sort_by(compare_by_shift);
        let names: Vec<&str> = metrics.iter().map(|m| m.feature_name.as_str()).collect();
        assert_eq!(names, vec!["large", "small", "flat"]);
    }

    fn domain(prefix: &str, n: usize, offset: f64, clay_rows: usize, slope_rows: usize) -> SampleSet {
        let samples = (0..n)
            .map(|i| Sample {
                entity_id: format!("{prefix}{i}"),
                lon: 0.0,
                lat: 0.0,
                projected_x: i as f64,
                projected_y: 0.0,
                features: BTreeMap::from([
                    ("ndvi".to_string(), Some(i as f64 / n as f64 + offset)),
                    ("clay".to_string(), (i < clay_rows).then_some((i % 4) as f64)),
                    ("slope".to_string(), (i < slope_rows).then_some((i % 7) as f64)),
                ]),
                targets: BTreeMap::new(),
            })
            .collect();
        SampleSet::new(Schema::new(["ndvi", "clay", "slope"], Vec::<String>::new()), samples).unwrap()
    }

    #[test]
    fn test_analyze_drops_missing_per_domain() {
        let source = domain("s", 30, 0.0, 30, 25);
        let target = domain("t", 30, 0.5, 8, 30);
        let features: Vec<String> = ["ndvi", "clay", "slope"].iter().map(|f| f.to_string()).collect();

        let report = analyzer().analyze(&source, &target, &features).unwrap();

        assert_eq!(report.metrics.len(), 2);
        assert_eq!(report.metrics[0].feature_name, "ndvi");
        let slope = report.metric("slope").unwrap();
        assert_eq!((slope.source_n, slope.target_n), (25, 30));

        assert_eq!(
            report.skipped,
            vec![SkippedFeature {
                feature_name: "clay".to_string(),
                source_n: 30,
                target_n: 8,
                reason: SkipReason::InsufficientData {
                    available: 8,
                    required: 10
                },
            }]
        );
        let json = serde_json::to_string(&report.skipped[0]).unwrap();
        assert!(json.contains(r#""reason":"insufficient_data""#));
        assert!(json.contains(r#""target_n":8"#));
    }

    #[test]
    fn test_analyze_rejects_unknown_feature() {
        let source = domain("s", 12, 0.0, 12, 12);
        let target = domain("t", 12, 0.0, 12, 12);
        let err = analyzer()
            .analyze(&source, &target, &["elevation".to_string()])
            .unwrap_err();
        assert!(matches!(err, TransferError::Configuration(_)));
    }
}
