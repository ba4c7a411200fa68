//! Spatial blocking and block-level fold assignment
//!
//! Blocks, not points, are the unit of cross-validation: every sample of
//! a block lands in the same fold, so spatially autocorrelated neighbours
//! never straddle a train/test split.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

use crate::config::PartitionConfig;
use crate::errors::{Result, TransferError};
use crate::sample::SampleSet;

/// Grid cell index, counted in blocks from the south-west corner of the
/// sample extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId {
    pub col: i64,
    pub row: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// A non-empty grid cell and the entities inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialBlock {
    pub block_id: BlockId,
    pub bbox: BoundingBox,
    pub member_ids: BTreeSet<String>,
}

/// Blocks covering one sample set. Membership is fixed once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialPartition {
    block_size: f64,
    origin: (f64, f64),
    blocks: Vec<SpatialBlock>,
    membership: HashMap<String, BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFold {
    pub block_id: BlockId,
    pub fold: usize,
}

/// Block → fold mapping, sorted by block id.
///
/// Every fold index is below `n_folds` and each block appears once;
/// deserialization goes through the same checks as `from_blocks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FoldAssignmentRecord")]
pub struct FoldAssignment {
    n_folds: usize,
    seed: u64,
    assignments: Vec<BlockFold>,
}

#[derive(Deserialize)]
struct FoldAssignmentRecord {
    n_folds: usize,
    seed: u64,
    assignments: Vec<BlockFold>,
}

impl TryFrom<FoldAssignmentRecord> for FoldAssignment {
    type Error = TransferError;

    fn try_from(record: FoldAssignmentRecord) -> Result<Self> {
        FoldAssignment::from_blocks(record.n_folds, record.seed, record.assignments)
    }
}

/// Tiles projected coordinates into square blocks.
#[derive(Debug, Clone)]
pub struct SpatialBlockPartitioner {
    block_size: f64,
}

impl SpatialBlockPartitioner {
    pub fn new(block_size: f64) -> Result<Self> {
        if !block_size.is_finite() || block_size <= 0.0 {
            return Err(TransferError::Configuration(format!(
                "block_size must be a positive finite length, got {block_size}"
            )));
        }
        Ok(Self { block_size })
    }

    pub fn from_config(config: &PartitionConfig) -> Result<Self> {
        Self::new(config.block_size)
    }

    pub fn block_size(&self) -> f64 {
        self.block_size
    }

    /// Assign every sample to the grid cell containing it. Empty cells are
    /// never materialized.
    pub fn partition(&self, samples: &SampleSet) -> Result<SpatialPartition> {
        if samples.is_empty() {
            return Err(TransferError::InsufficientData(
                "cannot partition an empty sample set".to_string(),
            ));
        }

        let origin = samples.samples().iter().fold(
            (f64::INFINITY, f64::INFINITY),
            |(x, y), s| (x.min(s.projected_x), y.min(s.projected_y)),
        );

        let mut cells: BTreeMap<BlockId, BTreeSet<String>> = BTreeMap::new();
        let mut membership = HashMap::with_capacity(samples.len());

        for sample in samples.samples() {
            let block_id = BlockId {
                col: ((sample.projected_x - origin.0) / self.block_size).floor() as i64,
                row: ((sample.projected_y - origin.1) / self.block_size).floor() as i64,
            };
            cells
                .entry(block_id)
                .or_default()
                .insert(sample.entity_id.clone());
            membership.insert(sample.entity_id.clone(), block_id);
        }

        let blocks: Vec<SpatialBlock> = cells
            .into_iter()
            .map(|(block_id, member_ids)| {
                let min_x = origin.0 + block_id.col as f64 * self.block_size;
                let min_y = origin.1 + block_id.row as f64 * self.block_size;
                SpatialBlock {
                    block_id,
                    bbox: BoundingBox {
                        min_x,
                        min_y,
                        max_x: min_x + self.block_size,
                        max_y: min_y + self.block_size,
                    },
                    member_ids,
                }
            })
            .collect();

        info!(
            n_samples = samples.len(),
            n_blocks = blocks.len(),
            block_size = self.block_size,
            "spatial partition built"
        );

        Ok(SpatialPartition {
            block_size: self.block_size,
            origin,
            blocks,
            membership,
        })
    }
}

impl SpatialPartition {
    pub fn block_size(&self) -> f64 {
        self.block_size
    }

    /// South-west corner of the sample extent
    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    /// Non-empty blocks in block-id order
    pub fn blocks(&self) -> &[SpatialBlock] {
        &self.blocks
    }

    pub fn block_of(&self, entity_id: &str) -> Option<BlockId> {
        self.membership.get(entity_id).copied()
    }

    /// Shuffle block ids with `seed`, then deal them round-robin into
    /// `n_folds` folds. Fold sizes differ by at most one block.
    pub fn assign_folds(&self, n_folds: usize, seed: u64) -> Result<FoldAssignment> {
        if n_folds < 2 {
            return Err(TransferError::Configuration(format!(
                "n_folds must be at least 2, got {n_folds}"
            )));
        }
        if self.blocks.len() < n_folds {
            return Err(TransferError::Configuration(format!(
                "{n_folds} folds requested but only {} non-empty blocks exist (short by {})",
                self.blocks.len(),
                n_folds - self.blocks.len()
            )));
        }

        let mut ids: Vec<BlockId> = self.blocks.iter().map(|b| b.block_id).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        ids.shuffle(&mut rng);

        let assignments: Vec<BlockFold> = ids
            .into_iter()
            .enumerate()
            .map(|(i, block_id)| BlockFold {
                block_id,
                fold: i % n_folds,
            })
            .collect();

        info!(n_folds, seed, n_blocks = assignments.len(), "folds assigned");
        FoldAssignment::from_blocks(n_folds, seed, assignments)
    }
}

impl FoldAssignment {
    /// Build an assignment from explicit block → fold pairs.
    ///
    /// Rejects fold indices outside `0..n_folds` and repeated blocks.
    pub fn from_blocks(n_folds: usize, seed: u64, mut assignments: Vec<BlockFold>) -> Result<Self> {
        if n_folds < 2 {
            return Err(TransferError::Configuration(format!(
                "n_folds must be at least 2, got {n_folds}"
            )));
        }
        if let Some(bad) = assignments.iter().find(|a| a.fold >= n_folds) {
            return Err(TransferError::Configuration(format!(
                "block ({}, {}) assigned to fold {} of {n_folds}",
                bad.block_id.col, bad.block_id.row, bad.fold
            )));
        }
        assignments.sort_by_key(|a| a.block_id);
        if let Some(pair) = assignments.windows(2).find(|w| w[0].block_id == w[1].block_id) {
            return Err(TransferError::Configuration(format!(
                "block ({}, {}) assigned more than once",
                pair[0].block_id.col, pair[0].block_id.row
            )));
        }
        Ok(Self {
            n_folds,
            seed,
            assignments,
        })
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Block → fold pairs in block-id order
    pub fn assignments(&self) -> &[BlockFold] {
        &self.assignments
    }

    pub fn fold_of_block(&self, block_id: BlockId) -> Option<usize> {
        self.assignments
            .binary_search_by_key(&block_id, |a| a.block_id)
            .ok()
            .map(|i| self.assignments[i].fold)
    }

    /// Fold of a sample, via its block.
    pub fn fold_of_entity(&self, partition: &SpatialPartition, entity_id: &str) -> Option<usize> {
        partition
            .block_of(entity_id)
            .and_then(|block| self.fold_of_block(block))
    }

    /// Number of blocks per fold
    pub fn fold_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_folds];
        for a in &self.assignments {
            sizes[a.fold] += 1;
        }
        sizes
    }

    pub fn blocks_in_fold(&self, fold: usize) -> Vec<BlockId> {
        self.assignments
            .iter()
            .filter(|a| a.fold == fold)
            .map(|a| a.block_id)
            .collect()
    }

    /// Entity → fold for every sample with a block in this assignment.
    pub fn sample_folds(&self, partition: &SpatialPartition) -> BTreeMap<String, usize> {
        partition
            .blocks()
            .iter()
            .filter_map(|block| {
                self.fold_of_block(block.block_id)
                    .map(|fold| (block, fold))
            })
            .flat_map(|(block, fold)| block.member_ids.iter().map(move |id| (id.clone(), fold)))
            .collect()
    }
}
