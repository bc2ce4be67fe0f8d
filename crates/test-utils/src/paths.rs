//! Scratch directories and workspaces for tests.

use std::path::{Path, PathBuf};

use crate::grib2::{write_grib2_file, Grib2Builder};

/// Creates a temporary directory for test output.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// Scratch layout mirroring a pipeline run: `Data/` for inputs and
/// `Outputs/` for results, removed on drop.
pub struct ForecastWorkspace {
    dir: tempfile::TempDir,
}

impl ForecastWorkspace {
    pub fn new() -> Self {
        let dir = temp_test_dir_with_prefix("forecast_ws_");
        std::fs::create_dir_all(dir.path().join("Data")).expect("create Data dir");
        std::fs::create_dir_all(dir.path().join("Outputs")).expect("create Outputs dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("Data")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.dir.path().join("Outputs")
    }

    /// Write a forecast file into `Data/`.
    pub fn add_forecast(&self, name: &str, messages: &[Grib2Builder]) -> PathBuf {
        write_grib2_file(&self.data_dir(), name, messages)
    }

    /// Write arbitrary bytes into `Data/`.
    pub fn add_raw(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.data_dir().join(name);
        std::fs::write(&path, bytes).expect("write raw test file");
        path
    }
}

impl Default for ForecastWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_test_dir_with_prefix() {
        let dir = temp_test_dir_with_prefix("weather_test_");
        let path_str = dir.path().to_string_lossy();
        assert!(path_str.contains("weather_test_"));
    }

    #[test]
    fn test_forecast_workspace_layout() {
        let ws = ForecastWorkspace::new();
        assert!(ws.data_dir().is_dir());
        assert!(ws.outputs_dir().is_dir());

        let path = ws.add_forecast("a.grib2", &[Grib2Builder::new()]);
        assert!(path.exists());
        assert!(path.starts_with(ws.root()));
    }
}
