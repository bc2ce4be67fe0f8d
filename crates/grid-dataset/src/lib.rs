//! Gridded forecast datasets with Zarr V3 persistence.
//!
//! This crate holds the in-memory model shared by the ingestion stages:
//!
//! - [`Dataset`]: named `f32` variables on a regular latitude/longitude
//!   grid, with an optional forecast-step axis
//! - merging of per-layer datasets and concatenation along `step`
//! - a combined view over many stores ([`MultiStoreView`])
//! - Zarr V3 read/write ([`ZarrDatasetWriter`], [`read_dataset`])
//! - atomic publication of finished stores ([`publish_dataset`])
//!
//! # Example
//!
//! ```ignore
//! use grid_dataset::{Dataset, StoreConfig, Variable, ZarrDatasetWriter};
//!
//! let mut ds = Dataset::new(lats, lons);
//! ds.insert("tmp_2m", Variable::grid(values, Default::default()))?;
//! ZarrDatasetWriter::new(StoreConfig::default()).write(&ds, path)?;
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod multistore;
pub mod publish;
pub mod zarr;

pub use config::{StoreConfig, ZarrCompression};
pub use dataset::{Attributes, Dataset, Dim, StepCoord, Variable, RESERVED_NAMES};
pub use error::{DatasetError, Result};
pub use multistore::MultiStoreView;
pub use publish::{publish_dataset, staging_path};
pub use zarr::{check_store, read_dataset, read_steps, WriteSummary, ZarrDatasetWriter};
