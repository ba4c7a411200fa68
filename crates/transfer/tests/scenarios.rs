//! End-to-end runs over synthetic regions
//!
//! Each test drives the public API the way an orchestrating pipeline
//! would and checks the reported numbers, not internals.

mod common;

use anyhow::Result;
use common::{names, sample, small_forest_config, standard_normal, vegetation_domain};
use opencarbon_ensemble::{BaggedForest, ForestConfig, MaxFeatures};
use opencarbon_transfer::{
    BlockCrossValidator, DistributionShiftAnalyzer, FeatureReconciliation, LinkedObservation,
    MultiTaskLinkedModeler, SampleSet, Schema, SelectionMode, Severity, ShiftConfig,
    SkipReason, SpatialBlockPartitioner, TransferConfig, TransferableFeatureSelector,
};
use std::collections::BTreeMap;

#[test]
fn test_block_cv_recovers_noise_level() -> Result<()> {
    // 10 x 10 blocks of 100 m, two points per block.
    let noise = standard_normal(200, 99);
    let xs: Vec<f64> = standard_normal(200, 3)
        .iter()
        .map(|z| 5.0 + 1.5 * z)
        .collect();
    let samples = (0..200)
        .map(|i| {
            let block = i / 2;
            let position = (
                (block % 10) as f64 * 100.0 + 25.0 + (i % 2) as f64 * 50.0,
                (block / 10) as f64 * 100.0 + 50.0,
            );
            sample(
                format!("p{i:03}"),
                position,
                &[("x", Some(xs[i]))],
                &[("agb", Some(2.0 * xs[i] + noise[i]))],
            )
        })
        .collect();
    let samples = SampleSet::new(Schema::new(["x"], ["agb"]), samples)?;

    let mut config = TransferConfig::default();
    config.seed = 7;
    config.partition.block_size = 100.0;
    config.partition.n_folds = 5;
    config.forest = ForestConfig {
        n_trees: 100,
        max_depth: 12,
        min_samples_leaf: 5,
        max_features: MaxFeatures::All,
    };

    let partition = SpatialBlockPartitioner::from_config(&config.partition)?.partition(&samples)?;
    assert_eq!(partition.blocks().len(), 100);
    let assignment = partition.assign_folds(config.partition.n_folds, config.seed)?;
    assert_eq!(assignment.fold_sizes(), vec![20; 5]);

    let forest = config.forest.clone();
    let report = BlockCrossValidator::new(&config)?.evaluate(
        &samples,
        &names(&["x"]),
        "agb",
        &partition,
        &assignment,
        || BaggedForest::new(forest.clone()),
    )?;

    assert_eq!(report.summary.n_evaluated, 5);
    assert!(report.skipped.is_empty());
    for fold in &report.folds {
        assert_eq!(fold.n_train + fold.n_test, 200);
        assert_eq!(fold.n_test, 40);
    }
    let rmse = report.summary.rmse_mean;
    assert!((0.8..=1.2).contains(&rmse), "cv rmse {rmse} not within 20% of sigma");
    assert!(report.summary.interval_coverage_mean.is_some());
    Ok(())
}

#[test]
fn test_shift_of_point_eight_sd_is_large() -> Result<()> {
    let draws = standard_normal(500, 21);
    let domain = |prefix: &str, offset: f64| {
        let samples = draws
            .iter()
            .enumerate()
            .map(|(i, z)| {
                sample(
                    format!("{prefix}{i}"),
                    (i as f64, 0.0),
                    &[("elevation", Some(z + offset))],
                    &[],
                )
            })
            .collect();
        SampleSet::new(Schema::new(["elevation"], Vec::<String>::new()), samples)
    };
    let source = domain("s", 0.0)?;
    let target = domain("t", 0.8)?;

    let report = DistributionShiftAnalyzer::new(ShiftConfig::default()).analyze(
        &source,
        &target,
        &names(&["elevation"]),
    )?;

    let metric = report.metric("elevation").expect("elevation analysed");
    let d = metric.cohens_d.expect("effect size defined");
    assert!((d - 0.8).abs() <= 0.1, "cohens_d {d}");
    assert_eq!(metric.severity, Some(Severity::Large));
    assert!(metric.ks_pvalue < 1e-6);

    let json = serde_json::to_string(metric)?;
    assert!(json.contains("\"severity\":\"large\""));
    Ok(())
}

#[test]
fn test_top_n_larger_than_candidates() -> Result<()> {
    let mut config = small_forest_config(11);
    config.selection.top_n = 10;

    let selection = TransferableFeatureSelector::new(&config)?.select(
        &vegetation_domain("s", 120),
        &vegetation_domain("t", 60),
        &names(&["ndvi", "height", "noise"]),
        "biomass",
    )?;

    assert_eq!(selection.mode, SelectionMode::Transfer);
    assert_eq!(selection.features.len(), 3);
    for pair in selection.scores.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
    Ok(())
}

#[test]
fn test_tiny_target_falls_back_to_source_only() -> Result<()> {
    let config = small_forest_config(11);

    let selection = TransferableFeatureSelector::new(&config)?.select(
        &vegetation_domain("s", 120),
        &vegetation_domain("t", 5),
        &names(&["ndvi", "height", "noise"]),
        "biomass",
    )?;

    assert_eq!(selection.mode, SelectionMode::SourceOnly);
    assert_eq!(selection.target_n, 5);
    for score in &selection.scores {
        assert_eq!(score.mode, SelectionMode::SourceOnly);
        assert!(score.target_importance.is_none());
        assert_eq!(score.final_score, score.source_importance.mean);
    }

    let json = serde_json::to_string(&selection)?;
    assert!(json.contains("\"mode\":\"source_only\""));
    Ok(())
}

fn depth_layers() -> Vec<LinkedObservation> {
    let mut observations = Vec::new();
    for i in 0..40 {
        let ndvi = (i % 10) as f64;
        let clay = ((i * 3) % 7) as f64;
        let features = BTreeMap::from([
            ("ndvi".to_string(), Some(ndvi)),
            ("clay".to_string(), Some(clay)),
        ]);
        let layers = [
            ("soc_0_10", Some(4.0 * ndvi + clay)),
            ("soc_10_30", Some(2.0 * ndvi + clay)),
            ("soc_30_60", Some(ndvi + 2.0 * clay)),
            ("soc_60_100", (i < 8).then_some(clay)),
        ];
        for (task, target) in layers {
            observations.push(LinkedObservation {
                entity_id: format!("core-{i}"),
                task_id: task.to_string(),
                lon: 0.0,
                lat: 0.0,
                projected_x: i as f64,
                projected_y: 0.0,
                features: features.clone(),
                target,
            });
        }
    }
    observations
}

#[test]
fn test_sparse_layer_does_not_move_consensus() -> Result<()> {
    let config = small_forest_config(17);
    let features = names(&["clay", "ndvi"]);
    let modeler = MultiTaskLinkedModeler::new(&config)?;

    let all = modeler.fit_linked(&depth_layers(), &features, FeatureReconciliation::AssertInvariant)?;
    assert_eq!(all.skipped_targets.len(), 1);
    assert_eq!(all.skipped_targets[0].task_id, "soc_60_100");
    assert_eq!(
        all.skipped_targets[0].reason,
        SkipReason::InsufficientData {
            available: 8,
            required: 20
        }
    );
    assert_eq!(all.tasks.len(), 3);

    let wide = opencarbon_transfer::reshape_linked(
        &depth_layers(),
        &features,
        FeatureReconciliation::AssertInvariant,
    )?;
    let three = modeler.fit(&wide, &features, &names(&["soc_0_10", "soc_10_30", "soc_30_60"]))?;

    assert!(three.skipped_targets.is_empty());
    assert_eq!(all.consensus, three.consensus);
    for task in &three.tasks {
        let same = all.task(&task.task_id).expect("task trained in both runs");
        assert_eq!(same.importance, task.importance);
    }
    Ok(())
}
