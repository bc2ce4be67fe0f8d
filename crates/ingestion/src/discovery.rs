//! Source file discovery.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{IngestionError, Result};
use crate::metadata::{detect_file_type, FileType};

/// List the GRIB2 files directly inside `dir`, in lexicographic path order.
///
/// This order is fixed for the whole run and becomes the step order of the
/// combined dataset. Subdirectories are not searched.
pub fn discover_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestionError::Discovery {
            path: dir.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| IngestionError::Discovery {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        match detect_file_type(entry.path()) {
            FileType::Grib2 | FileType::Grib2Gz => files.push(entry.into_path()),
            FileType::Unknown => debug!(path = %entry.path().display(), "Ignoring non-GRIB2 file"),
        }
    }

    files.sort();

    if files.is_empty() {
        return Err(IngestionError::NoInputFiles(dir.to_path_buf()));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discovery_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "b.r.20240115.00z.006h.grib2",
            "a.r.20240115.00z.012h.grib2",
            "c.r.20240115.00z.000h.grib2.gz",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("d.r.20240115.00z.000h.grib2"), b"").unwrap();

        let files = discover_sources(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec![
                "a.r.20240115.00z.012h.grib2",
                "b.r.20240115.00z.006h.grib2",
                "c.r.20240115.00z.000h.grib2.gz",
            ]
        );
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_sources(dir.path()),
            Err(IngestionError::NoInputFiles(_))
        ));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_sources(&dir.path().join("Data")).unwrap_err();
        assert!(matches!(err, IngestionError::Discovery { .. }));
    }
}
