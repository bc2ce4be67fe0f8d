//! Temp-backed merge aggregation.
//!
//! Each per-file result is written to its own transient Zarr store so that
//! only one file's fields are held in memory during extraction. Once every
//! file has been staged, the stores are opened as one view and concatenated
//! along the step axis in staging order.

use std::fs;
use std::path::{Path, PathBuf};

use grid_dataset::{
    Dataset, DatasetError, MultiStoreView, StepCoord, StoreConfig, ZarrDatasetWriter,
};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IngestionError, Result};
use crate::extract::FileMergedResult;

/// An on-disk staging copy of one file's merged result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientArtifact {
    pub path: PathBuf,
    /// Name of the source file.
    pub source: String,
    /// Position on the step axis.
    pub index: usize,
}

/// Stages per-file results and combines them.
pub struct Aggregator {
    staging_dir: PathBuf,
    prefix: String,
    writer: ZarrDatasetWriter,
    artifacts: Vec<TransientArtifact>,
}

impl Aggregator {
    /// Aggregator staging under `staging_dir`; `prefix` is prepended to
    /// every artifact name.
    pub fn new(staging_dir: &Path, prefix: &str, store: StoreConfig) -> Result<Self> {
        fs::create_dir_all(staging_dir).map_err(|source| IngestionError::Staging {
            path: staging_dir.to_path_buf(),
            source,
        })?;

        Ok(Self {
            staging_dir: staging_dir.to_path_buf(),
            prefix: prefix.to_string(),
            writer: ZarrDatasetWriter::new(store),
            artifacts: Vec::new(),
        })
    }

    /// Write one file's result to a new transient artifact.
    ///
    /// On failure nothing is recorded and any partial store is removed.
    pub fn stage(
        &mut self,
        result: FileMergedResult,
    ) -> std::result::Result<&TransientArtifact, DatasetError> {
        let index = self.artifacts.len();
        let source = result.source.name();
        let path = self.staging_dir.join(format!(
            "{}-{:04}-{}.zarr",
            self.prefix,
            index,
            Uuid::new_v4().simple()
        ));

        let step = StepCoord {
            forecast_hours: result.source.forecast_hours,
            init_time: result.source.init_time,
            valid_time: result.source.valid_time,
            source: source.clone(),
        };

        let written = result
            .dataset
            .expand_step(step)
            .and_then(|dataset| self.writer.write(&dataset, &path));

        match written {
            Ok(summary) => {
                debug!(
                    file = %source,
                    artifact = %path.display(),
                    variables = summary.variables,
                    bytes = summary.bytes_written,
                    "Staged transient artifact"
                );
                self.artifacts.push(TransientArtifact {
                    path,
                    source,
                    index,
                });
                Ok(&self.artifacts[index])
            }
            Err(e) => {
                if path.exists() {
                    if let Err(rm) = fs::remove_dir_all(&path) {
                        warn!(
                            artifact = %path.display(),
                            error = %rm,
                            "Failed to remove partial artifact"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    pub fn artifacts(&self) -> &[TransientArtifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Concatenate every staged artifact along the step axis.
    ///
    /// `attempted` is the number of files that were tried, for the error
    /// raised when nothing was staged.
    pub fn combine(&self, attempted: usize) -> Result<Dataset> {
        if self.artifacts.is_empty() {
            return Err(IngestionError::NoData { attempted });
        }

        let combine_err = |source| IngestionError::Combine {
            artifacts: self.artifacts.len(),
            source,
        };

        let view = MultiStoreView::open(self.artifacts.iter().map(|a| a.path.clone()))
            .map_err(combine_err)?;
        let mut combined = view.concat_steps().map_err(combine_err)?;

        let sources: Vec<&str> = self.artifacts.iter().map(|a| a.source.as_str()).collect();
        combined
            .attributes
            .insert("source_files".to_string(), json!(sources));

        info!(
            artifacts = self.artifacts.len(),
            steps = combined.steps.len(),
            variables = combined.len(),
            "Combined staged artifacts"
        );

        Ok(combined)
    }

    /// Hand the artifacts over for reclamation.
    pub fn into_artifacts(self) -> Vec<TransientArtifact> {
        self.artifacts
    }
}
