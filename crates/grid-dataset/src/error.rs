//! Error types for gridded datasets.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building, combining or persisting datasets.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Variable data does not match the dataset shape.
    #[error("variable '{name}' has {actual} values, expected {expected}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Variable dimensions are not valid for this dataset.
    #[error("variable '{name}' has invalid dimensions: {reason}")]
    InvalidDimensions { name: String, reason: String },

    /// Two datasets do not share the same latitude/longitude coordinates.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// A variable name collides with a coordinate or existing variable.
    #[error("variable name '{0}' is already in use")]
    NameInUse(String),

    /// Variable not present.
    #[error("variable '{0}' not found")]
    VariableNotFound(String),

    /// Nothing to combine.
    #[error("no datasets to concatenate")]
    Empty,

    /// Invalid metadata in a stored dataset.
    #[error("invalid dataset metadata: {0}")]
    InvalidMetadata(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    ZarrError(String),

    /// Storage/IO error.
    #[error("storage error at {path}: {message}")]
    StorageError { path: PathBuf, message: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl DatasetError {
    /// Create a ZarrError.
    pub fn zarr_error(msg: impl ToString) -> Self {
        Self::ZarrError(msg.to_string())
    }

    /// Create a StorageError for a path.
    pub fn storage(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::StorageError {
            path: path.into(),
            message: msg.to_string(),
        }
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;
