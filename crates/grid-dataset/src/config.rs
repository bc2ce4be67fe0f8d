//! Configuration for Zarr dataset stores.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// How datasets are chunked and compressed on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Chunk edge for the latitude/longitude axes (square chunks).
    pub zarr_chunk_size: usize,

    /// Compression codec for Zarr files.
    pub zarr_compression: ZarrCompression,

    /// Compression level (1-9).
    pub zarr_compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub zarr_shuffle: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            zarr_chunk_size: 512,
            zarr_compression: ZarrCompression::BloscZstd,
            zarr_compression_level: 1,
            zarr_shuffle: true,
        }
    }
}

impl StoreConfig {
    /// Apply `ZARR_*` environment variables on top of this configuration.
    ///
    /// Unparseable values are reported rather than ignored.
    pub fn apply_env(&mut self) -> Result<(), DatasetError> {
        if let Ok(val) = std::env::var("ZARR_CHUNK_SIZE") {
            self.zarr_chunk_size = val.parse().map_err(|_| {
                DatasetError::ConfigError(format!("ZARR_CHUNK_SIZE: invalid value '{}'", val))
            })?;
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION") {
            self.zarr_compression = val.parse()?;
        }

        if let Ok(val) = std::env::var("ZARR_COMPRESSION_LEVEL") {
            self.zarr_compression_level = val.parse().map_err(|_| {
                DatasetError::ConfigError(format!(
                    "ZARR_COMPRESSION_LEVEL: invalid value '{}'",
                    val
                ))
            })?;
        }

        if let Ok(val) = std::env::var("ZARR_SHUFFLE") {
            self.zarr_shuffle = val.to_lowercase() == "true" || val == "1";
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.zarr_chunk_size == 0 {
            return Err(DatasetError::ConfigError(
                "zarr_chunk_size must be > 0".to_string(),
            ));
        }

        if self.zarr_compression != ZarrCompression::None
            && (self.zarr_compression_level == 0 || self.zarr_compression_level > 9)
        {
            return Err(DatasetError::ConfigError(
                "zarr_compression_level must be 1-9".to_string(),
            ));
        }

        Ok(())
    }
}

/// Compression codec for Zarr files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl FromStr for ZarrCompression {
    type Err = DatasetError;

    /// Parse from string (case-insensitive). "lz4" and "zstd" select the
    /// Blosc variants.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz4" | "blosc_lz4" => Ok(Self::BloscLz4),
            "zstd" | "blosc_zstd" => Ok(Self::BloscZstd),
            other => Err(DatasetError::ConfigError(format!(
                "unknown Zarr compression '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
