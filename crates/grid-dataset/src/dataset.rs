//! In-memory gridded dataset on a regular latitude/longitude grid.
//!
//! A [`Dataset`] holds 1-D latitude and longitude coordinates, an optional
//! forecast-step axis, and named `f32` variables laid out row-major over
//! their dimensions (`[latitude, longitude]` or `[step, latitude, longitude]`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// Free-form attributes, stored as JSON.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Coordinate names reserved by the dataset layout.
pub const RESERVED_NAMES: [&str; 5] = ["latitude", "longitude", "step", "valid_time", "init_time"];

const COORD_TOLERANCE: f64 = 1e-9;

/// Dataset dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dim {
    Step,
    Latitude,
    Longitude,
}

impl Dim {
    pub fn name(&self) -> &'static str {
        match self {
            Dim::Step => "step",
            Dim::Latitude => "latitude",
            Dim::Longitude => "longitude",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "step" => Some(Dim::Step),
            "latitude" => Some(Dim::Latitude),
            "longitude" => Some(Dim::Longitude),
            _ => None,
        }
    }
}

/// One entry of the step axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCoord {
    /// Forecast lead time in hours.
    pub forecast_hours: u32,
    /// Model initialization time.
    pub init_time: DateTime<Utc>,
    /// `init_time + forecast_hours`.
    pub valid_time: DateTime<Utc>,
    /// File the step was read from.
    pub source: String,
}

/// A named array over some of the dataset dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub dims: Vec<Dim>,
    pub data: Vec<f32>,
    pub attributes: Attributes,
}

impl Variable {
    /// A `[latitude, longitude]` field.
    pub fn grid(data: Vec<f32>, attributes: Attributes) -> Self {
        Self {
            dims: vec![Dim::Latitude, Dim::Longitude],
            data,
            attributes,
        }
    }

    pub fn has_step(&self) -> bool {
        self.dims.first() == Some(&Dim::Step)
    }

    /// Replace every value in place.
    pub fn map_values(&mut self, f: impl Fn(f32) -> f32) {
        for value in self.data.iter_mut() {
            *value = f(*value);
        }
    }
}

/// A set of variables sharing one latitude/longitude grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub steps: Vec<StepCoord>,
    pub attributes: Attributes,
    variables: BTreeMap<String, Variable>,
}

impl Dataset {
    /// Empty dataset on the given grid, without a step axis.
    pub fn new(latitude: Vec<f64>, longitude: Vec<f64>) -> Self {
        Self {
            latitude,
            longitude,
            steps: Vec::new(),
            attributes: Attributes::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Number of points in one latitude/longitude slice.
    pub fn grid_len(&self) -> usize {
        self.latitude.len() * self.longitude.len()
    }

    /// Length of each dimension, in order.
    pub fn shape_of(&self, dims: &[Dim]) -> Vec<usize> {
        dims.iter()
            .map(|dim| match dim {
                Dim::Step => self.steps.len(),
                Dim::Latitude => self.latitude.len(),
                Dim::Longitude => self.longitude.len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.get_mut(name)
    }

    /// Variable names in sorted order.
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.variables.iter()
    }

    pub fn variables_mut(&mut self) -> impl Iterator<Item = (&String, &mut Variable)> {
        self.variables.iter_mut()
    }

    /// Add a variable, checking its dimensions and size against the grid.
    pub fn insert(&mut self, name: impl Into<String>, variable: Variable) -> Result<()> {
        let name = name.into();

        if RESERVED_NAMES.contains(&name.as_str()) || self.variables.contains_key(&name) {
            return Err(DatasetError::NameInUse(name));
        }

        self.check_variable(&name, &variable)?;
        self.variables.insert(name, variable);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.variables.remove(name)
    }

    /// Rename a variable. Renaming onto an existing name is an error.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if RESERVED_NAMES.contains(&to) || self.variables.contains_key(to) {
            return Err(DatasetError::NameInUse(to.to_string()));
        }
        let variable = self
            .variables
            .remove(from)
            .ok_or_else(|| DatasetError::VariableNotFound(from.to_string()))?;
        self.variables.insert(to.to_string(), variable);
        Ok(())
    }

    fn check_variable(&self, name: &str, variable: &Variable) -> Result<()> {
        let valid_dims = match variable.dims.as_slice() {
            [Dim::Latitude, Dim::Longitude] => true,
            [Dim::Step, Dim::Latitude, Dim::Longitude] => !self.steps.is_empty(),
            _ => false,
        };
        if !valid_dims {
            return Err(DatasetError::InvalidDimensions {
                name: name.to_string(),
                reason: format!(
                    "{:?} (dataset has {} steps)",
                    variable.dims,
                    self.steps.len()
                ),
            });
        }

        let expected: usize = self.shape_of(&variable.dims).iter().product();
        if variable.data.len() != expected {
            return Err(DatasetError::ShapeMismatch {
                name: name.to_string(),
                expected,
                actual: variable.data.len(),
            });
        }
        Ok(())
    }

    /// True when both datasets share the same latitude and longitude values.
    pub fn same_grid(&self, other: &Dataset) -> bool {
        coords_match(&self.latitude, &other.latitude)
            && coords_match(&self.longitude, &other.longitude)
    }

    /// Merge `other` into `self`.
    ///
    /// Existing variables win; attributes from `other` override. Returns the
    /// names of variables from `other` that were dropped because `self`
    /// already had them.
    pub fn merge(&mut self, other: Dataset) -> Result<Vec<String>> {
        if !self.same_grid(&other) {
            return Err(DatasetError::GridMismatch(format!(
                "cannot merge {}x{} grid into {}x{} grid",
                other.latitude.len(),
                other.longitude.len(),
                self.latitude.len(),
                self.longitude.len()
            )));
        }
        if other.steps != self.steps {
            return Err(DatasetError::InvalidDimensions {
                name: "<merge>".to_string(),
                reason: "step axes differ".to_string(),
            });
        }

        let mut dropped = Vec::new();
        for (name, variable) in other.variables {
            if self.variables.contains_key(&name) {
                dropped.push(name);
            } else {
                self.check_variable(&name, &variable)?;
                self.variables.insert(name, variable);
            }
        }

        self.attributes.extend(other.attributes);

        Ok(dropped)
    }

    /// Give a step-less dataset a step axis of length one.
    pub fn expand_step(mut self, step: StepCoord) -> Result<Dataset> {
        if !self.steps.is_empty() {
            return Err(DatasetError::InvalidDimensions {
                name: "<dataset>".to_string(),
                reason: "dataset already has a step axis".to_string(),
            });
        }
        self.steps.push(step);
        for variable in self.variables.values_mut() {
            if !variable.has_step() {
                variable.dims.insert(0, Dim::Step);
            }
        }
        Ok(self)
    }

    /// Concatenate datasets along the step axis.
    ///
    /// Every part must carry a step axis and share the same grid. The result
    /// holds the union of all variables; steps where a part lacks a variable
    /// are filled with NaN. Dataset and variable attributes come from the
    /// first part that has them.
    pub fn concat_steps(parts: Vec<Dataset>) -> Result<Dataset> {
        let first = parts.first().ok_or(DatasetError::Empty)?;

        for (index, part) in parts.iter().enumerate() {
            if part.steps.is_empty() {
                return Err(DatasetError::InvalidDimensions {
                    name: format!("<part {}>", index),
                    reason: "no step axis".to_string(),
                });
            }
            if !first.same_grid(part) {
                return Err(DatasetError::GridMismatch(format!(
                    "part {} ({}) has a {}x{} grid, part 0 has {}x{}",
                    index,
                    part.steps[0].source,
                    part.latitude.len(),
                    part.longitude.len(),
                    first.latitude.len(),
                    first.longitude.len()
                )));
            }
        }

        let grid_len = first.grid_len();
        let mut combined = Dataset::new(first.latitude.clone(), first.longitude.clone());
        combined.attributes = first.attributes.clone();

        // Union of names with first-seen attributes
        let mut templates: BTreeMap<String, Attributes> = BTreeMap::new();
        for part in &parts {
            for (name, variable) in &part.variables {
                templates
                    .entry(name.clone())
                    .or_insert_with(|| variable.attributes.clone());
            }
        }

        let total_steps: usize = parts.iter().map(|p| p.steps.len()).sum();
        let mut columns: BTreeMap<String, Vec<f32>> = templates
            .keys()
            .map(|name| (name.clone(), Vec::with_capacity(total_steps * grid_len)))
            .collect();

        for part in parts {
            let block = part.steps.len() * grid_len;
            for (name, column) in columns.iter_mut() {
                match part.variables.get(name) {
                    Some(variable) if variable.has_step() => {
                        column.extend_from_slice(&variable.data)
                    }
                    Some(variable) => {
                        // Step-less field: repeat it for each step of the part
                        for _ in 0..part.steps.len() {
                            column.extend_from_slice(&variable.data);
                        }
                    }
                    None => column.extend(std::iter::repeat(f32::NAN).take(block)),
                }
            }
            combined.steps.extend(part.steps);
        }

        for (name, data) in columns {
            let attributes = templates.remove(&name).unwrap_or_default();
            combined.insert(
                name,
                Variable {
                    dims: vec![Dim::Step, Dim::Latitude, Dim::Longitude],
                    data,
                    attributes,
                },
            )?;
        }

        Ok(combined)
    }

    /// Reorder the longitude axis: new column `k` is old column `order[k]`.
    pub fn permute_longitude(&mut self, order: &[usize]) -> Result<()> {
        let nlon = self.longitude.len();
        let mut seen = vec![false; nlon];
        if order.len() != nlon
            || order
                .iter()
                .any(|&i| i >= nlon || std::mem::replace(&mut seen[i], true))
        {
            return Err(DatasetError::InvalidDimensions {
                name: "longitude".to_string(),
                reason: "order is not a permutation of the longitude axis".to_string(),
            });
        }

        self.longitude = order.iter().map(|&i| self.longitude[i]).collect();

        for variable in self.variables.values_mut() {
            let mut reordered = Vec::with_capacity(variable.data.len());
            for row in variable.data.chunks_exact(nlon) {
                reordered.extend(order.iter().map(|&i| row[i]));
            }
            variable.data = reordered;
        }
        Ok(())
    }
}

fn coords_match(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= COORD_TOLERANCE)
}
