//! Atomic publication of dataset stores.
//!
//! A store is written to a hidden sibling directory and renamed over the
//! target once complete, so readers never observe a half-written store.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::error::{DatasetError, Result};
use crate::zarr::{WriteSummary, ZarrDatasetWriter};

/// Write `dataset` to `target`, replacing any existing store there.
pub fn publish_dataset(
    writer: &ZarrDatasetWriter,
    dataset: &Dataset,
    target: &Path,
) -> Result<WriteSummary> {
    let staging = staging_path(target)?;

    let summary = match writer.write(dataset, &staging) {
        Ok(summary) => summary,
        Err(e) => {
            discard(&staging);
            return Err(e);
        }
    };

    if let Err(e) = replace(&staging, target) {
        discard(&staging);
        return Err(e);
    }

    debug!(target = %target.display(), "Published dataset");
    Ok(summary)
}

/// Hidden sibling path used while a store is being written.
pub fn staging_path(target: &Path) -> Result<PathBuf> {
    let file_name = target
        .file_name()
        .ok_or_else(|| DatasetError::storage(target, "target has no file name"))?;
    let parent = target.parent().unwrap_or_else(|| Path::new("."));

    fs::create_dir_all(parent).map_err(|e| DatasetError::storage(parent, e))?;

    Ok(parent.join(format!(
        ".{}.{}.partial",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    )))
}

fn replace(staging: &Path, target: &Path) -> Result<()> {
    if target.is_dir() {
        fs::remove_dir_all(target).map_err(|e| DatasetError::storage(target, e))?;
    } else if target.exists() {
        fs::remove_file(target).map_err(|e| DatasetError::storage(target, e))?;
    }
    fs::rename(staging, target).map_err(|e| DatasetError::storage(target, e))
}

fn discard(staging: &Path) {
    if staging.exists() {
        if let Err(e) = fs::remove_dir_all(staging) {
            warn!(path = %staging.display(), error = %e, "Failed to remove staging store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::dataset::{Attributes, Variable};

    fn dataset(value: f32) -> Dataset {
        let mut ds = Dataset::new(vec![0.0, 1.0], vec![0.0, 1.0]);
        ds.insert("v", Variable::grid(vec![value; 4], Attributes::new()))
            .unwrap();
        ds
    }

    #[test]
    fn test_staging_is_hidden_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.zarr");
        let staging = staging_path(&target).unwrap();

        assert_eq!(staging.parent(), target.parent());
        let name = staging.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(".out.zarr."));
        assert!(name.ends_with(".partial"));
    }

    #[test]
    fn test_publish_replaces_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Outputs").join("out.zarr");
        let writer = ZarrDatasetWriter::new(StoreConfig::default());

        publish_dataset(&writer, &dataset(1.0), &target).unwrap();
        publish_dataset(&writer, &dataset(2.0), &target).unwrap();

        let read = crate::zarr::read_dataset(&target).unwrap();
        assert_eq!(read.variable("v").unwrap().data, vec![2.0; 4]);

        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
