//! Pipeline configuration.
//!
//! Layers, later ones winning: built-in defaults, an optional YAML file,
//! then `GRIB_*` / `ZARR_*` environment variables. The binary applies its
//! command-line flags last.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use grid_dataset::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, Result};
use crate::lifecycle::RetryPolicy;
use crate::normalize::{default_renames, NormalizeOptions};

/// Soil depths (cm) extracted from every file by default.
pub const DEFAULT_SOIL_DEPTHS_CM: [u32; 3] = [0, 7, 28];

/// Retry settings for deleting transient artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimConfig {
    pub max_attempts: u32,
    pub delay_secs: f64,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_secs: 2.0,
        }
    }
}

impl ReclaimConfig {
    pub fn policy(&self) -> Result<RetryPolicy> {
        let delay = Duration::try_from_secs_f64(self.delay_secs).map_err(|_| {
            IngestionError::InvalidConfig(format!(
                "reclaim.delay_secs must be a non-negative number, got {}",
                self.delay_secs
            ))
        })?;
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            delay,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory scanned for source files.
    pub input_dir: PathBuf,

    /// Cleaned dataset store.
    pub output_path: PathBuf,

    /// Combined dataset store, before cleaning. `None` skips it.
    pub combined_output_path: Option<PathBuf>,

    /// Parent directory of transient artifacts. Defaults to the platform
    /// temp directory.
    pub staging_dir: Option<PathBuf>,

    pub soil_depths_cm: Vec<u32>,

    pub sentinel: f32,

    pub fill_value: f32,

    /// Variable renames applied during cleaning.
    pub renames: BTreeMap<String, String>,

    /// Coordinate reference system tag for the cleaned dataset.
    pub crs: String,

    pub reclaim: ReclaimConfig,

    pub store: StoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let normalize = NormalizeOptions::default();
        Self {
            input_dir: PathBuf::from("./Data"),
            output_path: PathBuf::from("Outputs/final_cleaned_dataset.zarr"),
            combined_output_path: Some(PathBuf::from("Outputs/final_dataset.zarr")),
            staging_dir: None,
            soil_depths_cm: DEFAULT_SOIL_DEPTHS_CM.to_vec(),
            sentinel: normalize.sentinel,
            fill_value: normalize.fill_value,
            renames: default_renames(),
            crs: normalize.crs,
            reclaim: ReclaimConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the YAML file if given, then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestionError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
            .map_err(|e| IngestionError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Parse YAML; omitted fields keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| IngestionError::InvalidConfig(e.to_string()))
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("GRIB_INPUT_DIR") {
            self.input_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("GRIB_OUTPUT") {
            self.output_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("GRIB_COMBINED_OUTPUT") {
            self.combined_output_path = if val.is_empty() || val.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
        if let Ok(val) = std::env::var("GRIB_STAGING_DIR") {
            self.staging_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("GRIB_SENTINEL") {
            self.sentinel = parse_env("GRIB_SENTINEL", &val)?;
        }
        if let Ok(val) = std::env::var("GRIB_FILL_VALUE") {
            self.fill_value = parse_env("GRIB_FILL_VALUE", &val)?;
        }
        if let Ok(val) = std::env::var("GRIB_RECLAIM_ATTEMPTS") {
            self.reclaim.max_attempts = parse_env("GRIB_RECLAIM_ATTEMPTS", &val)?;
        }
        if let Ok(val) = std::env::var("GRIB_RECLAIM_DELAY_SECS") {
            self.reclaim.delay_secs = parse_env("GRIB_RECLAIM_DELAY_SECS", &val)?;
        }

        self.store
            .apply_env()
            .map_err(|e| IngestionError::InvalidConfig(e.to_string()))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.soil_depths_cm.is_empty() {
            return Err(IngestionError::InvalidConfig(
                "soil_depths_cm must not be empty".to_string(),
            ));
        }
        let mut depths = HashSet::new();
        if let Some(dup) = self.soil_depths_cm.iter().find(|d| !depths.insert(**d)) {
            return Err(IngestionError::InvalidConfig(format!(
                "soil depth {} cm is listed twice",
                dup
            )));
        }

        if self.reclaim.max_attempts == 0 {
            return Err(IngestionError::InvalidConfig(
                "reclaim.max_attempts must be > 0".to_string(),
            ));
        }
        self.reclaim.policy()?;

        if !self.sentinel.is_finite() || !self.fill_value.is_finite() {
            return Err(IngestionError::InvalidConfig(
                "sentinel and fill_value must be finite".to_string(),
            ));
        }

        let mut targets = HashSet::new();
        for (from, to) in &self.renames {
            if !targets.insert(to.as_str()) {
                return Err(IngestionError::InvalidConfig(format!(
                    "rename target '{}' is used more than once",
                    to
                )));
            }
            if from == to {
                return Err(IngestionError::InvalidConfig(format!(
                    "rename '{}' maps to itself",
                    from
                )));
            }
        }

        if self.combined_output_path.as_deref() == Some(self.output_path.as_path()) {
            return Err(IngestionError::InvalidConfig(
                "combined_output_path and output_path must differ".to_string(),
            ));
        }

        self.store
            .validate()
            .map_err(|e| IngestionError::InvalidConfig(e.to_string()))
    }

    /// Staging directory, resolved against the platform temp directory.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            sentinel: self.sentinel,
            fill_value: self.fill_value,
            renames: self.renames.clone(),
            crs: self.crs.clone(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T> {
    val.trim()
        .parse()
        .map_err(|_| IngestionError::InvalidConfig(format!("{}: invalid value '{}'", name, val)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.input_dir, PathBuf::from("./Data"));
        assert_eq!(config.soil_depths_cm, vec![0, 7, 28]);
        assert_eq!(config.sentinel, -9999.0);
        assert_eq!(config.fill_value, 0.0);
        assert_eq!(config.renames["swvl2"], "sw-15");
        assert_eq!(config.crs, "EPSG:4326");
        assert_eq!(config.reclaim.policy().unwrap(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = PipelineConfig::from_yaml_str(
            r#"
input_dir: /data/gfs
fill_value: -1.5
reclaim:
  delay_secs: 0.25
store:
  zarr_compression: blosc_lz4
"#,
        )
        .unwrap();

        assert_eq!(config.input_dir, PathBuf::from("/data/gfs"));
        assert_eq!(config.fill_value, -1.5);
        assert_eq!(config.reclaim.max_attempts, 5);
        assert_eq!(
            config.reclaim.policy().unwrap().delay,
            Duration::from_millis(250)
        );
        assert_eq!(config.store.zarr_chunk_size, 512);
        assert_eq!(config.soil_depths_cm, vec![0, 7, 28]);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(
            PipelineConfig::from_yaml_str("  \n").unwrap(),
            PipelineConfig::default()
        );
    }

    #[test]
    fn test_unknown_yaml_value_rejected() {
        assert!(PipelineConfig::from_yaml_str("soil_depths_cm: deep").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: Vec<Box<dyn Fn(&mut PipelineConfig)>> = vec![
            Box::new(|c| c.soil_depths_cm.clear()),
            Box::new(|c| c.soil_depths_cm = vec![0, 7, 7]),
            Box::new(|c| c.reclaim.max_attempts = 0),
            Box::new(|c| c.reclaim.delay_secs = -1.0),
            Box::new(|c| c.store.zarr_chunk_size = 0),
            Box::new(|c| c.store.zarr_compression_level = 12),
            Box::new(|c| {
                c.renames.insert("swvl4".to_string(), "sw-5".to_string());
            }),
            Box::new(|c| c.combined_output_path = Some(c.output_path.clone())),
        ];

        for (i, mutate) in cases.iter().enumerate() {
            let mut config = PipelineConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(IngestionError::InvalidConfig(_))),
                "case {} should be rejected",
                i
            );
        }
    }
}
