//! OpenCarbon ensemble - deterministic bagged regression trees
//!
//! Provides the regression contract used by the transfer-learning core,
//! a CART-based bagged forest implementing it, and the statistics built
//! on member predictions (empirical quantiles, permutation importance,
//! regression scores).
//!
//! Modules:
//! - `regressor`: `Regressor` / `EnsembleRegressor` traits
//! - `cart`: exact-greedy regression tree builder
//! - `forest`: bagged forest over CART trees
//! - `quantile`: interpolated empirical quantiles
//! - `importance`: permutation importance for any `Regressor`
//! - `metrics`: RMSE / MAE / R² against a reference mean
//! - `deterministic`: seed derivation and split tie-breaking

pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod forest;
pub mod importance;
pub mod metrics;
pub mod quantile;
pub mod regressor;

pub use cart::{MaxFeatures, Node, Tree};
pub use dataset::{BootstrapDraw, TrainingSet};
pub use deterministic::{derive_keyed_seed, derive_seed, unit_rng, SplitTieBreaker};
pub use errors::{EnsembleError, Result};
pub use forest::{BaggedForest, ForestConfig};
pub use importance::permutation_importance;
pub use metrics::{mean_squared_error, score, RegressionScores};
pub use quantile::{empirical_quantile, quantiles, QuantileValue};
pub use regressor::{EnsembleRegressor, Regressor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
