use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opencarbon_ensemble::{BaggedForest, EnsembleRegressor, ForestConfig, Regressor, TrainingSet};

fn synthetic(n: usize) -> TrainingSet {
    let features = (0..n)
        .map(|i| vec![(i % 97) as f64, (i % 13) as f64, (i * 7 % 31) as f64])
        .collect();
    let targets = (0..n).map(|i| (i % 97) as f64 * 0.5 + (i % 13) as f64).collect();
    TrainingSet::new(features, targets).expect("synthetic data is rectangular")
}

fn bench_fit(c: &mut Criterion) {
    let data = synthetic(500);
    c.bench_function("forest_fit_100_trees", |b| {
        b.iter(|| {
            let mut forest = BaggedForest::new(ForestConfig::default());
            forest.fit(black_box(&data), 42).expect("fit");
            forest
        })
    });
}

fn bench_quantiles(c: &mut Criterion) {
    let data = synthetic(500);
    let mut forest = BaggedForest::new(ForestConfig::default());
    forest.fit(&data, 42).expect("fit");
    let levels = [0.025, 0.25, 0.5, 0.75, 0.975];

    c.bench_function("forest_predict_quantiles", |b| {
        b.iter(|| forest.predict_quantiles(black_box(&[40.0, 5.0, 12.0]), &levels))
    });
}

criterion_group!(benches, bench_fit, bench_quantiles);
criterion_main!(benches);
