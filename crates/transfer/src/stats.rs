//! Descriptive statistics and the two-sample Kolmogorov–Smirnov test

use crate::errors::{Result, TransferError};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values.
pub fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Mean and sample standard deviation over per-unit values.
pub fn mean_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    (mean(values), sample_sd(values))
}

/// Standardized mean difference, target minus source, over the pooled sd
/// `sqrt((sd_s² + sd_t²) / 2)`.
pub fn cohens_d(source_mean: f64, source_sd: f64, target_mean: f64, target_sd: f64) -> Result<f64> {
    let pooled = ((source_sd * source_sd + target_sd * target_sd) / 2.0).sqrt();
    if !(pooled > 0.0) {
        return Err(TransferError::DegenerateDistribution(
            "pooled standard deviation is zero".to_string(),
        ));
    }
    Ok((target_mean - source_mean) / pooled)
}

/// Result of a two-sample Kolmogorov–Smirnov test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsTest {
    pub statistic: f64,
    pub p_value: f64,
}

/// Two-sample KS test. The statistic is the largest gap between the two
/// empirical CDFs (ties handled); the p-value uses the asymptotic
/// Kolmogorov distribution with the Stephens small-sample correction.
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> KsTest {
    if a.is_empty() || b.is_empty() {
        return KsTest {
            statistic: 0.0,
            p_value: 1.0,
        };
    }

    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| x.total_cmp(y));
    b.sort_by(|x, y| x.total_cmp(y));

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut statistic: f64 = 0.0;

    while i < a.len() && j < b.len() {
        let x = if a[i] <= b[j] { a[i] } else { b[j] };
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        statistic = statistic.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let p_value = kolmogorov_survival((en + 0.12 + 0.11 / en) * statistic);

    KsTest {
        statistic: statistic.clamp(0.0, 1.0),
        p_value,
    }
}

/// P(K > lambda) for the Kolmogorov distribution.
pub fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;

    for k in 1..=100 {
        let kf = k as f64;
        let term = fac * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= 1e-3 * previous || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        previous = term.abs();
    }

    // Series failed to converge, which only happens for tiny lambda.
    1.0
}
