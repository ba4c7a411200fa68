//! Deterministic utilities for reproducible training
//!
//! Seed derivation for parallel workers and tie-breaking for split
//! selection, so identical inputs produce identical models regardless of
//! how work is scheduled across threads.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Ordering;

/// Derive the seed of the `index`-th parallel unit from a base seed.
pub fn derive_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add(index as u64)
}

/// Derive a seed from a stable key (e.g. a task id) rather than a position.
///
/// Adding or removing other keys never changes the seed of this one.
pub fn derive_keyed_seed(seed: u64, key: &str) -> u64 {
    const PRIME1: u64 = 0x9E37_79B1_85EB_CA87;
    const PRIME2: u64 = 0xC2B2_AE3D_27D4_EB4F;
    const PRIME3: u64 = 0x1656_67B1_9E37_79F9;
    const PRIME5: u64 = 0x85EB_CA77_C2B2_AE63;

    let mut h = seed.wrapping_add(PRIME5);

    for &byte in key.as_bytes() {
        h = h.wrapping_add((byte as u64).wrapping_mul(PRIME3));
        h = h.rotate_left(17).wrapping_mul(PRIME2);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;

    h
}

/// Seeded RNG for one unit of work.
pub fn unit_rng(seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, index))
}

/// Deterministic tie-breaker for split selection
/// Orders candidates by (feature_idx, threshold) so equal-gain splits
/// always resolve the same way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold: f64,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: f64) -> Self {
        Self {
            feature_idx,
            threshold,
        }
    }

    /// Total order over candidates.
    pub fn cmp(&self, other: &Self) -> Ordering {
        self.feature_idx
            .cmp(&other.feature_idx)
            .then_with(|| self.threshold.total_cmp(&other.threshold))
    }

    pub fn precedes(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Less
    }
}
