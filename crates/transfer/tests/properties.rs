//! Property tests for fold assignment, shift metrics and selection

mod common;

use common::{names, sample, small_forest_config, vegetation_domain};
use opencarbon_transfer::{
    DistributionShiftAnalyzer, SampleSet, Schema, ShiftConfig, SpatialBlockPartitioner,
    TransferableFeatureSelector,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn point_set(points: &[(f64, f64)]) -> SampleSet {
    let samples = points
        .iter()
        .enumerate()
        .map(|(i, &xy)| sample(format!("pt{i}"), xy, &[("x", Some(xy.0))], &[]))
        .collect();
    SampleSet::new(Schema::new(["x"], Vec::<String>::new()), samples).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_blocks_never_span_folds(
        points in proptest::collection::vec((0.0f64..2_000.0, 0.0f64..2_000.0), 10..120),
        block_size in 50.0f64..600.0,
        n_folds in 2usize..6,
        seed in any::<u64>(),
    ) {
        let samples = point_set(&points);
        let partition = SpatialBlockPartitioner::new(block_size).unwrap().partition(&samples).unwrap();
        prop_assume!(partition.blocks().len() >= n_folds);
        let assignment = partition.assign_folds(n_folds, seed).unwrap();

        let folds = assignment.sample_folds(&partition);
        prop_assert_eq!(folds.len(), samples.len());
        for block in partition.blocks() {
            let fold = assignment.fold_of_block(block.block_id).unwrap();
            for member in &block.member_ids {
                prop_assert_eq!(folds[member], fold);
            }
        }

        let sizes = assignment.fold_sizes();
        let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
        prop_assert!(max - min <= 1);
    }

    #[test]
    fn prop_fold_assignment_deterministic(
        points in proptest::collection::vec((0.0f64..1_000.0, 0.0f64..1_000.0), 10..80),
        seed in any::<u64>(),
    ) {
        let samples = point_set(&points);
        let partitioner = SpatialBlockPartitioner::new(100.0).unwrap();
        let first = partitioner.partition(&samples).unwrap();
        let second = partitioner.partition(&samples).unwrap();
        prop_assume!(first.blocks().len() >= 2);

        let a = first.assign_folds(2, seed).unwrap();
        let b = second.assign_folds(2, seed).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_shift_is_antisymmetric(
        source in proptest::collection::vec(-100.0f64..100.0, 10..60),
        target in proptest::collection::vec(-100.0f64..100.0, 10..60),
    ) {
        let analyzer = DistributionShiftAnalyzer::new(ShiftConfig::default());
        let forward = analyzer.compare("f", &source, &target).unwrap();
        let backward = analyzer.compare("f", &target, &source).unwrap();

        match (forward.cohens_d, backward.cohens_d) {
            (Some(d1), Some(d2)) => prop_assert!((d1 + d2).abs() < 1e-9),
            (None, None) => {}
            other => prop_assert!(false, "asymmetric definedness: {:?}", other),
        }
        prop_assert!((forward.ks_statistic - backward.ks_statistic).abs() < 1e-12);
        prop_assert_eq!(forward.severity, backward.severity);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn prop_selection_never_pads(top_n in 1usize..12) {
        let mut config = small_forest_config(3);
        config.selection.top_n = top_n;
        config.selection.bootstrap_rounds = 1;
        config.forest.n_trees = 5;

        let selection = TransferableFeatureSelector::new(&config)
            .unwrap()
            .select(
                &vegetation_domain("s", 40),
                &vegetation_domain("t", 40),
                &names(&["ndvi", "height", "noise"]),
                "biomass",
            )
            .unwrap();

        prop_assert_eq!(selection.features.len(), top_n.min(3));
        prop_assert_eq!(selection.scores.len(), 3);
        let ranks: Vec<usize> = selection.scores.iter().map(|s| s.rank).collect();
        prop_assert_eq!(ranks, vec![1, 2, 3]);
    }
}

#[test]
fn test_sample_folds_cover_every_entity() {
    let samples = point_set(&[(0.0, 0.0), (10.0, 0.0), (150.0, 0.0), (310.0, 0.0)]);
    let partition = SpatialBlockPartitioner::new(100.0).unwrap().partition(&samples).unwrap();
    let assignment = partition.assign_folds(3, 1).unwrap();
    let folds: BTreeMap<String, usize> = assignment.sample_folds(&partition);
    assert_eq!(folds.len(), 4);
    assert_eq!(folds["pt0"], folds["pt1"]);
}
