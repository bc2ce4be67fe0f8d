//! Zarr V3 persistence for [`Dataset`].
//!
//! Layout of a dataset store:
//!
//! ```text
//! <store>/
//!   zarr.json          root group, dataset attributes + `_dataset` layout
//!   latitude/          float64 [latitude]
//!   longitude/         float64 [longitude]
//!   step/              uint32  [step]        (forecast hours, if present)
//!   valid_time/        int64   [step]        (seconds since epoch, if present)
//!   init_time/         int64   [step]        (seconds since epoch, if present)
//!   <variable>/        float32 [step?, latitude, longitude]
//! ```
//!
//! Every array carries `_ARRAY_DIMENSIONS` so xarray can open the store.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, ElementOwned, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use crate::config::{StoreConfig, ZarrCompression};
use crate::dataset::{Attributes, Dataset, Dim, StepCoord, Variable};
use crate::error::{DatasetError, Result};

const LAYOUT_KEY: &str = "_dataset";
const DIMENSIONS_KEY: &str = "_ARRAY_DIMENSIONS";

/// Layout record kept in the root group attributes.
#[derive(Debug, Serialize, Deserialize)]
struct StoredLayout {
    variables: Vec<String>,
    steps: Vec<StepCoord>,
}

/// Summary of a dataset write.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    pub variables: usize,
    pub steps: usize,
    /// Uncompressed size of all arrays.
    pub bytes_written: u64,
}

/// Writes datasets as Zarr V3 stores on the local filesystem.
pub struct ZarrDatasetWriter {
    config: StoreConfig,
}

impl ZarrDatasetWriter {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Write `dataset` to a new store directory at `path`.
    pub fn write(&self, dataset: &Dataset, path: &Path) -> Result<WriteSummary> {
        std::fs::create_dir_all(path).map_err(|e| DatasetError::storage(path, e))?;
        let store =
            Arc::new(FilesystemStore::new(path).map_err(|e| DatasetError::storage(path, e))?);

        let layout = StoredLayout {
            variables: dataset.variable_names(),
            steps: dataset.steps.clone(),
        };
        let mut group_attrs = dataset.attributes.clone();
        group_attrs.insert(LAYOUT_KEY.to_string(), serde_json::to_value(&layout)?);

        let group = GroupBuilder::new()
            .attributes(group_attrs)
            .build(store.clone(), "/")
            .map_err(DatasetError::zarr_error)?;
        group.store_metadata().map_err(DatasetError::zarr_error)?;

        let mut bytes_written = 0u64;

        bytes_written += self.write_coordinate(
            &store,
            "latitude",
            &dataset.latitude,
            coordinate_attrs("latitude", "degrees_north"),
        )?;
        bytes_written += self.write_coordinate(
            &store,
            "longitude",
            &dataset.longitude,
            coordinate_attrs("longitude", "degrees_east"),
        )?;

        if !dataset.steps.is_empty() {
            let hours: Vec<u32> = dataset.steps.iter().map(|s| s.forecast_hours).collect();
            bytes_written += self.write_coordinate(
                &store,
                "step",
                &hours,
                coordinate_attrs("step", "hours"),
            )?;

            let valid: Vec<i64> = dataset
                .steps
                .iter()
                .map(|s| s.valid_time.timestamp())
                .collect();
            let mut attrs = coordinate_attrs("step", "seconds since 1970-01-01 00:00:00");
            attrs.insert("standard_name".to_string(), serde_json::json!("time"));
            bytes_written += self.write_coordinate(&store, "valid_time", &valid, attrs)?;

            let init: Vec<i64> = dataset
                .steps
                .iter()
                .map(|s| s.init_time.timestamp())
                .collect();
            let attrs = coordinate_attrs("step", "seconds since 1970-01-01 00:00:00");
            bytes_written += self.write_coordinate(&store, "init_time", &init, attrs)?;
        }

        for (name, variable) in dataset.variables() {
            bytes_written += self.write_variable(&store, dataset, name, variable)?;
        }

        debug!(
            path = %path.display(),
            variables = dataset.len(),
            steps = dataset.steps.len(),
            bytes = bytes_written,
            "Wrote Zarr dataset"
        );

        Ok(WriteSummary {
            variables: dataset.len(),
            steps: dataset.steps.len(),
            bytes_written,
        })
    }

    fn write_coordinate<T: CoordinateValue>(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
        values: &[T],
        attrs: Attributes,
    ) -> Result<u64> {
        let len = values.len() as u64;

        let chunk_grid: zarrs::array::ChunkGrid = vec![len.max(1)]
            .try_into()
            .map_err(|e| DatasetError::ConfigError(format!("{:?}", e)))?;

        let mut builder = ArrayBuilder::new(vec![len], T::data_type(), chunk_grid, T::fill_value());
        let array = builder
            .attributes(attrs)
            .build(store.clone(), &format!("/{}", name))
            .map_err(DatasetError::zarr_error)?;
        array.store_metadata().map_err(DatasetError::zarr_error)?;

        if len > 0 {
            let subset = ArraySubset::new_with_start_shape(vec![0], vec![len])
                .map_err(DatasetError::zarr_error)?;
            array
                .store_array_subset_elements(&subset, values)
                .map_err(DatasetError::zarr_error)?;
        }

        Ok(std::mem::size_of_val(values) as u64)
    }

    fn write_variable(
        &self,
        store: &Arc<FilesystemStore>,
        dataset: &Dataset,
        name: &str,
        variable: &Variable,
    ) -> Result<u64> {
        let shape: Vec<u64> = dataset
            .shape_of(&variable.dims)
            .into_iter()
            .map(|n| n as u64)
            .collect();

        let chunk = self.config.zarr_chunk_size as u64;
        let chunk_shape: Vec<u64> = variable
            .dims
            .iter()
            .zip(&shape)
            .map(|(dim, &len)| match dim {
                Dim::Step => 1,
                _ => chunk.min(len).max(1),
            })
            .collect();

        let mut attrs = variable.attributes.clone();
        attrs.insert(
            DIMENSIONS_KEY.to_string(),
            serde_json::json!(variable.dims.iter().map(Dim::name).collect::<Vec<_>>()),
        );

        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .try_into()
            .map_err(|e| DatasetError::ConfigError(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            shape.clone(),
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        );
        let mut builder = binding.attributes(attrs);

        if self.config.zarr_compression != ZarrCompression::None {
            builder = builder.bytes_to_bytes_codecs(vec![self.create_compression_codec()?]);
        }

        let array = builder
            .build(store.clone(), &format!("/{}", name))
            .map_err(DatasetError::zarr_error)?;
        array.store_metadata().map_err(DatasetError::zarr_error)?;

        if !variable.data.is_empty() {
            let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)
                .map_err(DatasetError::zarr_error)?;
            array
                .store_array_subset_elements(&subset, &variable.data)
                .map_err(DatasetError::zarr_error)?;
        }

        Ok(std::mem::size_of_val(variable.data.as_slice()) as u64)
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.zarr_compression_level)
            .map_err(|_| DatasetError::ConfigError("Invalid compression level".to_string()))?;

        let (shuffle, typesize) = if self.config.zarr_shuffle {
            (BloscShuffleMode::Shuffle, Some(4))
        } else {
            (BloscShuffleMode::NoShuffle, None)
        };

        let compressor = match self.config.zarr_compression {
            ZarrCompression::None => {
                return Err(DatasetError::ConfigError(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| DatasetError::ConfigError(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

/// Read a dataset store written by [`ZarrDatasetWriter`].
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let store = open_store(path)?;

    let group = Group::open(store.clone(), "/").map_err(DatasetError::zarr_error)?;
    let mut attributes = group.attributes().clone();
    let layout_value = attributes.remove(LAYOUT_KEY).ok_or_else(|| {
        DatasetError::InvalidMetadata(format!(
            "{} has no '{}' attribute",
            path.display(),
            LAYOUT_KEY
        ))
    })?;
    let layout: StoredLayout = serde_json::from_value(layout_value)?;

    let latitude: Vec<f64> = read_array(&store, "latitude")?.1;
    let longitude: Vec<f64> = read_array(&store, "longitude")?.1;

    let mut dataset = Dataset::new(latitude, longitude);
    dataset.attributes = attributes;
    dataset.steps = layout.steps;

    for name in layout.variables {
        let (mut attrs, data) = read_array::<f32>(&store, &name)?;
        let dims = parse_dims(&name, attrs.remove(DIMENSIONS_KEY))?;
        dataset.insert(
            name,
            Variable {
                dims,
                data,
                attributes: attrs,
            },
        )?;
    }

    Ok(dataset)
}

/// Step axis of a store, read from group metadata only.
pub fn read_steps(path: &Path) -> Result<Vec<StepCoord>> {
    let store = open_store(path)?;
    let group = Group::open(store, "/").map_err(DatasetError::zarr_error)?;
    let layout_value = group.attributes().get(LAYOUT_KEY).cloned().ok_or_else(|| {
        DatasetError::InvalidMetadata(format!(
            "{} has no '{}' attribute",
            path.display(),
            LAYOUT_KEY
        ))
    })?;
    let layout: StoredLayout = serde_json::from_value(layout_value)?;
    Ok(layout.steps)
}

/// Open and immediately drop the root group of a store.
///
/// Confirms the store is readable and leaves no handle behind.
pub fn check_store(path: &Path) -> Result<()> {
    let store = open_store(path)?;
    let group = Group::open(store, "/").map_err(DatasetError::zarr_error)?;
    drop(group);
    Ok(())
}

fn open_store(path: &Path) -> Result<Arc<FilesystemStore>> {
    if !path.is_dir() {
        return Err(DatasetError::storage(path, "no such dataset store"));
    }
    Ok(Arc::new(
        FilesystemStore::new(path).map_err(|e| DatasetError::storage(path, e))?,
    ))
}

fn read_array<T: ElementOwned>(
    store: &Arc<FilesystemStore>,
    name: &str,
) -> Result<(Attributes, Vec<T>)> {
    let array = Array::open(store.clone(), &format!("/{}", name))
        .map_err(DatasetError::zarr_error)?;
    let shape = array.shape().to_vec();

    let data = if shape.iter().any(|&n| n == 0) {
        Vec::new()
    } else {
        let subset = ArraySubset::new_with_shape(shape);
        array
            .retrieve_array_subset_elements::<T>(&subset)
            .map_err(DatasetError::zarr_error)?
    };

    Ok((array.attributes().clone(), data))
}

fn parse_dims(name: &str, value: Option<serde_json::Value>) -> Result<Vec<Dim>> {
    let names: Vec<String> = match value {
        Some(value) => serde_json::from_value(value)?,
        None => {
            return Err(DatasetError::InvalidMetadata(format!(
                "variable '{}' has no {}",
                name, DIMENSIONS_KEY
            )))
        }
    };

    names
        .iter()
        .map(|n| {
            Dim::from_name(n).ok_or_else(|| DatasetError::InvalidDimensions {
                name: name.to_string(),
                reason: format!("unknown dimension '{}'", n),
            })
        })
        .collect()
}

fn coordinate_attrs(dim: &str, units: &str) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(DIMENSIONS_KEY.to_string(), serde_json::json!([dim]));
    attrs.insert("units".to_string(), serde_json::json!(units));
    attrs
}

/// Element types usable for 1-D coordinate arrays.
trait CoordinateValue: ElementOwned + Copy {
    fn data_type() -> DataType;
    fn fill_value() -> FillValue;
}

impl CoordinateValue for f64 {
    fn data_type() -> DataType {
        DataType::Float64
    }
    fn fill_value() -> FillValue {
        FillValue::from(f64::NAN)
    }
}

impl CoordinateValue for u32 {
    fn data_type() -> DataType {
        DataType::UInt32
    }
    fn fill_value() -> FillValue {
        FillValue::from(0u32)
    }
}

impl CoordinateValue for i64 {
    fn data_type() -> DataType {
        DataType::Int64
    }
    fn fill_value() -> FillValue {
        FillValue::from(0i64)
    }
}
