//! Sentinel cleaning and coordinate normalization.
//!
//! Applied to the combined dataset in a fixed order: sentinel values become
//! missing (NaN), missing values take the fill value, longitude is wrapped
//! into [-180, 180) and stably sorted, variables are renamed, and the CRS is
//! attached as a dataset attribute.

use std::collections::BTreeMap;

use grid_dataset::Dataset;
use serde_json::json;
use tracing::{debug, info};

use crate::error::CleaningError;

/// Settings for [`Normalizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    pub sentinel: f32,
    pub fill_value: f32,
    /// Variable renames, applied only to names present in the dataset.
    pub renames: BTreeMap<String, String>,
    pub crs: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            sentinel: -9999.0,
            fill_value: 0.0,
            renames: default_renames(),
            crs: "EPSG:4326".to_string(),
        }
    }
}

/// Soil moisture layer codes to depth labels.
pub fn default_renames() -> BTreeMap<String, String> {
    [("swvl1", "sw-5"), ("swvl2", "sw-15"), ("swvl3", "sw-50")]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

/// Counts of what a normalization pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub sentinels_replaced: usize,
    pub missing_filled: usize,
    pub longitude_reordered: bool,
    pub renamed: Vec<(String, String)>,
}

pub struct Normalizer {
    options: NormalizeOptions,
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Clean and normalize `dataset`.
    ///
    /// A dataset without variables or without grid points is rejected
    /// before anything is changed.
    pub fn normalize(
        &self,
        mut dataset: Dataset,
    ) -> Result<(Dataset, NormalizeSummary), CleaningError> {
        if dataset.is_empty() || dataset.grid_len() == 0 {
            return Err(CleaningError::EmptyInput);
        }

        let mut summary = NormalizeSummary {
            sentinels_replaced: self.replace_sentinels(&mut dataset),
            ..Default::default()
        };
        summary.missing_filled = self.fill_missing(&mut dataset);
        summary.longitude_reordered = canonicalize_longitude(&mut dataset)?;
        summary.renamed = self.rename_variables(&mut dataset)?;

        dataset
            .attributes
            .insert("crs".to_string(), json!(self.options.crs));

        info!(
            sentinels = summary.sentinels_replaced,
            filled = summary.missing_filled,
            reordered = summary.longitude_reordered,
            renamed = summary.renamed.len(),
            "Normalized dataset"
        );
        Ok((dataset, summary))
    }

    /// Replace every value exactly equal to the sentinel with NaN.
    pub fn replace_sentinels(&self, dataset: &mut Dataset) -> usize {
        let sentinel = self.options.sentinel;
        let mut count = 0;
        for (_, variable) in dataset.variables_mut() {
            for value in variable.data.iter_mut() {
                if *value == sentinel {
                    *value = f32::NAN;
                    count += 1;
                }
            }
        }
        count
    }

    /// Replace every NaN with the fill value.
    pub fn fill_missing(&self, dataset: &mut Dataset) -> usize {
        let fill = self.options.fill_value;
        let mut count = 0;
        for (_, variable) in dataset.variables_mut() {
            for value in variable.data.iter_mut() {
                if value.is_nan() {
                    *value = fill;
                    count += 1;
                }
            }
        }
        count
    }

    /// Apply the rename table to the variables that exist.
    pub fn rename_variables(
        &self,
        dataset: &mut Dataset,
    ) -> Result<Vec<(String, String)>, CleaningError> {
        let mut renamed = Vec::new();
        for (from, to) in &self.options.renames {
            if !dataset.contains(from) {
                continue;
            }
            dataset
                .rename(from, to)
                .map_err(|source| CleaningError::Rename {
                    from: from.clone(),
                    to: to.clone(),
                    source,
                })?;
            debug!(from = %from, to = %to, "Renamed variable");
            renamed.push((from.clone(), to.clone()));
        }
        Ok(renamed)
    }
}

/// Map a longitude into [-180, 180).
pub fn canonical_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Indices that stably sort `lons` in ascending order.
pub fn longitude_order(lons: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..lons.len()).collect();
    order.sort_by(|&a, &b| lons[a].total_cmp(&lons[b]));
    order
}

/// Wrap the dataset's longitudes and sort the longitude axis.
///
/// Returns true when columns had to be reordered.
pub fn canonicalize_longitude(dataset: &mut Dataset) -> Result<bool, CleaningError> {
    for lon in dataset.longitude.iter_mut() {
        *lon = canonical_longitude(*lon);
    }

    let order = longitude_order(&dataset.longitude);
    let reordered = order.iter().enumerate().any(|(k, &i)| k != i);
    if reordered {
        dataset
            .permute_longitude(&order)
            .map_err(CleaningError::Reorder)?;
    }
    Ok(reordered)
}
