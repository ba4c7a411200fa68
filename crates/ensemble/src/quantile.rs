//! Empirical quantiles over member predictions

use serde::{Deserialize, Serialize};

/// One quantile level and its value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileValue {
    pub level: f64,
    pub value: f64,
}

/// Linear-interpolated order statistic of already sorted values
/// (the "type 7" definition: position `(n - 1) * q`).
///
/// For a fixed input, the result is non-decreasing in `q`.
pub fn empirical_quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let q = q.clamp(0.0, 1.0);
            let h = (n - 1) as f64 * q;
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = h - lo as f64;
            sorted[lo] + frac * (sorted[hi] - sorted[lo])
        }
    }
}

/// Sort a copy of `values` and evaluate every requested level.
pub fn quantiles(values: &[f64], levels: &[f64]) -> Vec<QuantileValue> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    levels
        .iter()
        .map(|&level| QuantileValue {
            level,
            value: empirical_quantile(&sorted, level),
        })
        .collect()
}
