//! Deterministic synthetic data shared by the integration tests

#![allow(dead_code)]

use opencarbon_ensemble::{ForestConfig, MaxFeatures};
use opencarbon_transfer::{Sample, SampleSet, Schema, TransferConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Inverse standard normal CDF (Acklam's rational approximation).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155833025e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838,
        -2.549671348243420,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996,
        3.754408661907416,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p > 1.0 - P_LOW {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    }
}

/// `n` stratified N(0, 1) draws in shuffled order.
pub fn standard_normal(n: usize, seed: u64) -> Vec<f64> {
    let mut values: Vec<f64> = (0..n)
        .map(|k| normal_quantile((k as f64 + 0.5) / n as f64))
        .collect();
    values.shuffle(&mut StdRng::seed_from_u64(seed));
    values
}

pub fn sample(
    entity_id: String,
    xy: (f64, f64),
    features: &[(&str, Option<f64>)],
    targets: &[(&str, Option<f64>)],
) -> Sample {
    Sample {
        entity_id,
        lon: 0.0,
        lat: 0.0,
        projected_x: xy.0,
        projected_y: xy.1,
        features: features
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect::<BTreeMap<_, _>>(),
        targets: targets
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// `biomass = 3 * ndvi + height`; `noise` carries no signal.
pub fn vegetation_domain(prefix: &str, n: usize) -> SampleSet {
    let schema = Schema::new(["ndvi", "height", "noise"], ["biomass"]);
    let samples = (0..n)
        .map(|i| {
            let ndvi = (i % 10) as f64;
            let height = ((i * 7) % 5) as f64;
            let noise = ((i * 31) % 11) as f64;
            sample(
                format!("{prefix}-{i}"),
                (i as f64 * 10.0, 0.0),
                &[("ndvi", Some(ndvi)), ("height", Some(height)), ("noise", Some(noise))],
                &[("biomass", Some(3.0 * ndvi + height))],
            )
        })
        .collect();
    SampleSet::new(schema, samples).expect("valid vegetation domain")
}

pub fn small_forest_config(seed: u64) -> TransferConfig {
    let mut config = TransferConfig::default();
    config.seed = seed;
    config.forest = ForestConfig {
        n_trees: 15,
        max_depth: 6,
        min_samples_leaf: 2,
        max_features: MaxFeatures::All,
    };
    config.selection.bootstrap_rounds = 3;
    config.multitask.bootstrap_rounds = 3;
    config
}
