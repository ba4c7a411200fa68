use thiserror::Error;

/// Errors returned while building or fitting regressors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnsembleError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("row {row}: expected {expected} features, got {actual}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("non-finite value at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },

    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),

    #[error("model has not been fitted")]
    NotFitted,
}

/// Result type for ensemble operations
pub type Result<T> = std::result::Result<T, EnsembleError>;
