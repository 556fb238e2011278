use thiserror::Error;

/// Result type for tree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tree operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Empty training dataset")]
    EmptyTrainingSet,

    #[error("Input dimensions mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Features and labels must be 0 or 1")]
    NonBinaryInput,

    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    #[error("Root node contains instances from a single class")]
    DegenerateRoot,

    #[error("No samples reached the node at depth {0}")]
    EmptyNode(usize),

    #[error("Unknown row key: {0}")]
    UnknownKey(usize),

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Numerical error: {0}")]
    Numerical(String),
}
