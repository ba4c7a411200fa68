//! OpenCarbon transfer - spatial transfer learning and domain adaptation
//!
//! Evaluates how well carbon-stock models trained on a data-rich source
//! region carry over to a sparse target region:
//! - `partition`: square spatial blocks and block-level fold assignment
//! - `shift`: per-feature covariate shift (Cohen's d, KS test)
//! - `quantile`: bagged-forest prediction intervals
//! - `cv`: spatial block cross-validation
//! - `selection`: features important in both domains
//! - `multitask`: one model per linked target plus a consensus ranking
//!
//! All randomness derives from the configured seed; results are identical
//! across runs and thread counts.

pub mod config;
pub mod cv;
pub mod errors;
pub mod importance;
pub mod logging;
pub mod multitask;
pub mod partition;
pub mod quantile;
pub mod sample;
pub mod selection;
pub mod shift;
pub mod stats;

pub use config::{
    ExecutionConfig, MultiTaskConfig, PartitionConfig, QuantileConfig, SelectionConfig,
    ShiftConfig, TransferConfig,
};
pub use cv::{BlockCrossValidator, CrossValidationReport, CvFoldResult, CvSummary, SkippedFold};
pub use errors::{Result, SkipReason, TransferError};
pub use importance::{ImportanceSummary, RunSummary};
pub use multitask::{
    reshape_linked, ConsensusFeature, FeatureImportance, FeatureReconciliation,
    LinkedObservation, MultiTaskLinkedModeler, MultiTaskResult, SkippedTarget, TaskModel,
};
pub use partition::{
    BlockFold, BlockId, BoundingBox, FoldAssignment, SpatialBlock, SpatialBlockPartitioner,
    SpatialPartition,
};
pub use quantile::{
    ExtrapolationWarning, PredictionBatch, QuantileEnsembleModel, QuantilePrediction,
    SkippedPrediction,
};
pub use sample::{DesignMatrix, Sample, SampleSet, Schema};
pub use selection::{FeatureScore, FeatureSelection, SelectionMode, TransferableFeatureSelector};
pub use shift::{
    DistributionShiftAnalyzer, MetricStatus, Severity, ShiftMetric, ShiftReport, SkippedFeature,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
