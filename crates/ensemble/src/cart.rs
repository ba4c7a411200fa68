//! CART (Classification and Regression Tree) builder
//!
//! Exact-greedy regression tree construction. Splits maximise the
//! reduction in squared error, evaluated on a random subset of features
//! per node (random-forest style).

use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::dataset::TrainingSet;
use crate::deterministic::SplitTieBreaker;

/// How many features each node may consider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    /// One third of the features, the usual regression-forest default.
    Third,
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(self, feature_count: usize) -> usize {
        let n = match self {
            MaxFeatures::All => feature_count,
            MaxFeatures::Sqrt => (feature_count as f64).sqrt().floor() as usize,
            MaxFeatures::Third => feature_count / 3,
            MaxFeatures::Count(n) => n,
        };
        n.clamp(1, feature_count.max(1))
    }
}

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub max_features: usize,
}

/// A decision tree node (internal or leaf)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub feature_index: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    /// Some for leaves
    pub value: Option<f64>,
}

impl Node {
    fn leaf(value: f64) -> Self {
        Self {
            feature_index: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }
}

/// A fitted regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Evaluate this tree on a feature vector
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if let Some(value) = node.value {
                return value;
            }

            let Some(&feature_value) = features.get(node.feature_index) else {
                return 0.0;
            };

            idx = if feature_value <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if node.value.is_none() => {
                    1 + walk(nodes, node.left).max(walk(nodes, node.right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.value.is_some()).count()
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    threshold: f64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain
            || (self.gain == other.gain && self.tie_breaker.precedes(&other.tie_breaker))
    }
}

/// Build a regression tree using exact-greedy CART algorithm
pub struct CartBuilder<'a> {
    config: TreeConfig,
    data: &'a TrainingSet,
}

impl<'a> CartBuilder<'a> {
    pub fn new(data: &'a TrainingSet, config: TreeConfig) -> Self {
        Self { config, data }
    }

    /// Build a tree over the given rows (duplicates allowed).
    pub fn build(&self, indices: &[usize], rng: &mut StdRng) -> Tree {
        let mut nodes = Vec::new();
        if indices.is_empty() {
            nodes.push(Node::leaf(0.0));
        } else {
            self.build_node(indices.to_vec(), 0, &mut nodes, rng);
        }
        Tree { nodes }
    }

    fn build_node(
        &self,
        indices: Vec<usize>,
        depth: usize,
        nodes: &mut Vec<Node>,
        rng: &mut StdRng,
    ) -> usize {
        let current_idx = nodes.len();
        let leaf_value = self.mean_target(&indices);

        if depth >= self.config.max_depth || indices.len() < 2 * self.config.min_samples_leaf {
            nodes.push(Node::leaf(leaf_value));
            return current_idx;
        }

        let Some((feature_idx, split)) = self.find_best_split(&indices, rng) else {
            nodes.push(Node::leaf(leaf_value));
            return current_idx;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.data.row(i)[feature_idx] <= split.threshold);

        // Reserve space for current node
        nodes.push(Node {
            feature_index: feature_idx,
            threshold: split.threshold,
            left: 0,
            right: 0,
            value: None,
        });

        let left_idx = self.build_node(left_indices, depth + 1, nodes, rng);
        let right_idx = self.build_node(right_indices, depth + 1, nodes, rng);

        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        let p = self.data.feature_count();
        if self.config.max_features >= p {
            (0..p).collect()
        } else {
            index::sample(rng, p, self.config.max_features).into_vec()
        }
    }

    /// Best split across the sampled features, scanning sorted values once
    /// per feature.
    fn find_best_split(
        &self,
        indices: &[usize],
        rng: &mut StdRng,
    ) -> Option<(usize, SplitCandidate)> {
        let targets = self.data.targets();
        let n = indices.len();
        let total_sum: f64 = indices.iter().map(|&i| targets[i]).sum();
        let parent_score = total_sum * total_sum / n as f64;
        let min_leaf = self.config.min_samples_leaf.max(1);

        let mut best: Option<(usize, SplitCandidate)> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature_idx in self.candidate_features(rng) {
            pairs.clear();
            pairs.extend(
                indices
                    .iter()
                    .map(|&i| (self.data.row(i)[feature_idx], targets[i])),
            );
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += pairs[pos].1;
                let left_n = pos + 1;
                let right_n = n - left_n;
                if left_n < min_leaf {
                    continue;
                }
                if right_n < min_leaf {
                    break;
                }
                let (lo, hi) = (pairs[pos].0, pairs[pos + 1].0);
                if lo >= hi {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                // Squared-error reduction: S_l²/n_l + S_r²/n_r - S²/n
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent_score;

                let mid = lo + (hi - lo) / 2.0;
                let threshold = if mid < hi { mid } else { lo };
                let candidate = SplitCandidate {
                    threshold,
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, threshold),
                };

                let replace = match &best {
                    None => true,
                    Some((_, current)) => candidate.beats(current),
                };
                if replace {
                    best = Some((feature_idx, candidate));
                }
            }
        }

        best.filter(|(_, split)| split.gain > 1e-12 * parent_score.abs().max(1.0))
    }

    fn mean_target(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let targets = self.data.targets();
        indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64
    }
}
