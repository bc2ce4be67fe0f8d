//! Error types for the ingestion crate.
//!
//! Only run-wide failures are errors. Per-file and per-layer problems are
//! recorded in the [`RunReport`](crate::RunReport) and the run continues.

use std::fmt;
use std::path::PathBuf;

use grid_dataset::DatasetError;
use serde::Serialize;
use thiserror::Error;

/// Pipeline stage, used to tag failures and skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configuration,
    Discovery,
    Parse,
    Extraction,
    Aggregation,
    Cleaning,
    Reclamation,
    Output,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configuration => "configuration",
            Stage::Discovery => "discovery",
            Stage::Parse => "parse",
            Stage::Extraction => "extraction",
            Stage::Aggregation => "aggregation",
            Stage::Cleaning => "cleaning",
            Stage::Reclamation => "reclamation",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort an ingestion run.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read input directory {path}: {message}")]
    Discovery { path: PathBuf, message: String },

    #[error("No input files found in {0}")]
    NoInputFiles(PathBuf),

    #[error("No data produced: none of {attempted} files could be extracted and staged")]
    NoData { attempted: usize },

    #[error("Failed to create staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to combine {artifacts} staged artifacts: {source}")]
    Combine {
        artifacts: usize,
        #[source]
        source: DatasetError,
    },

    #[error("Cleaning failed: {0}")]
    Cleaning(#[from] CleaningError),

    #[error("Failed to write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: DatasetError,
    },
}

impl IngestionError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            IngestionError::InvalidConfig(_) => Stage::Configuration,
            IngestionError::Discovery { .. } | IngestionError::NoInputFiles(_) => {
                Stage::Discovery
            }
            IngestionError::NoData { .. }
            | IngestionError::Staging { .. }
            | IngestionError::Combine { .. } => Stage::Aggregation,
            IngestionError::Cleaning(_) => Stage::Cleaning,
            IngestionError::Output { .. } => Stage::Output,
        }
    }
}

/// Errors from the sentinel cleaning and coordinate normalizer.
#[derive(Error, Debug)]
pub enum CleaningError {
    #[error("received an empty dataset")]
    EmptyInput,

    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: DatasetError,
    },

    #[error("failed to reorder longitude: {0}")]
    Reorder(#[source] DatasetError),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
