//! Per-file multi-layer extraction.
//!
//! A source file is read once into a main extract holding every field, and
//! one extract per configured soil depth. Depth extracts are merged over the
//! main extract, where their layer-numbered names (`swvl1`, `stl2`) replace
//! the generic `<param>_<depth>cm` names of the same fields. A depth with no
//! usable fields is recorded as absent and never fails the file.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use grib2_parser::{Grib2Error, Grib2Message, Grib2Reader, Grib2Tables};
use grid_dataset::{Attributes, Dataset, DatasetError, Variable};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::metadata::SourceFile;

/// Which part of a file an extract covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractKind {
    /// Every field of the file.
    Main,
    /// Fields on one depth-below-land layer. `layer` is the 1-based position
    /// of the depth in the configured depth list.
    Depth { depth_cm: u32, layer: usize },
}

impl fmt::Display for ExtractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractKind::Main => f.write_str("main"),
            ExtractKind::Depth { depth_cm, .. } => write!(f, "depth {} cm", depth_cm),
        }
    }
}

/// One extract of one file.
#[derive(Debug, Clone)]
pub struct LayerExtract {
    pub kind: ExtractKind,
    pub dataset: Dataset,
    /// Messages that matched the filter but were not used.
    pub skipped_messages: usize,
}

/// Result of a depth-filtered extraction.
#[derive(Debug, Clone)]
pub enum LayerOutcome {
    Present(LayerExtract),
    Absent { reason: String },
}

/// A depth layer missing from a file's merged result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsentLayer {
    pub depth_cm: u32,
    pub reason: String,
}

/// The main extract of a file merged with its available depth extracts.
#[derive(Debug, Clone)]
pub struct FileMergedResult {
    pub source: SourceFile,
    pub dataset: Dataset,
    pub present_depths: Vec<u32>,
    pub absent_depths: Vec<AbsentLayer>,
    /// Variables dropped because an earlier extract already defined them.
    pub dropped_variables: Vec<String>,
}

/// Failures that drop a whole file.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decompress {path}: {source}")]
    Decompress {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode GRIB2 data: {0}")]
    Decode(#[from] Grib2Error),

    #[error("no GRIB2 messages found")]
    NoMessages,

    #[error("none of {attempted} fields could be decoded")]
    NoFields { attempted: usize },

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Extracts the main layer and soil-depth layers of source files.
pub struct Extractor {
    tables: Grib2Tables,
    depths_cm: Vec<u32>,
}

impl Extractor {
    /// Extractor using the standard parameter tables.
    pub fn new(depths_cm: Vec<u32>) -> Self {
        Self::with_tables(Grib2Tables::standard(), depths_cm)
    }

    pub fn with_tables(tables: Grib2Tables, depths_cm: Vec<u32>) -> Self {
        Self { tables, depths_cm }
    }

    pub fn depths_cm(&self) -> &[u32] {
        &self.depths_cm
    }

    /// Extract and merge every layer of one file.
    pub fn extract_file(&self, source: &SourceFile) -> Result<FileMergedResult, ExtractError> {
        let file = source.name();
        let messages = self.read_messages(&source.path, source.is_gzip())?;
        let main = self.extract_main(&messages)?;

        debug!(
            file = %file,
            messages = messages.len(),
            variables = main.dataset.len(),
            "Extracted main layer"
        );

        let mut result = FileMergedResult {
            source: source.clone(),
            dataset: main.dataset,
            present_depths: Vec::new(),
            absent_depths: Vec::new(),
            dropped_variables: Vec::new(),
        };

        for (index, &depth_cm) in self.depths_cm.iter().enumerate() {
            let outcome = self.extract_depth(&messages, depth_cm, index + 1);
            let merged = match outcome {
                LayerOutcome::Present(layer) => {
                    self.merge_depth(&mut result.dataset, &messages, depth_cm, layer)
                }
                LayerOutcome::Absent { reason } => Err(reason),
            };

            match merged {
                Ok(dropped) => {
                    if !dropped.is_empty() {
                        warn!(
                            file = %file,
                            depth_cm,
                            dropped = ?dropped,
                            "Depth layer redefines existing variables, keeping the first"
                        );
                    }
                    result.dropped_variables.extend(dropped);
                    result.present_depths.push(depth_cm);
                }
                Err(reason) => {
                    warn!(file = %file, depth_cm, reason = %reason, "Skipping depth layer");
                    result.absent_depths.push(AbsentLayer { depth_cm, reason });
                }
            }
        }

        Ok(result)
    }

    /// Read and decode every message of a file.
    ///
    /// A structural error after at least one good message ends the file
    /// early with a warning; an error before any message fails it.
    pub fn read_messages(
        &self,
        path: &Path,
        gzip: bool,
    ) -> Result<Vec<Grib2Message>, ExtractError> {
        let raw = fs::read(path).map_err(|source| ExtractError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let data = if gzip {
            decompress_gzip(&raw).map_err(|source| ExtractError::Decompress {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Bytes::from(raw)
        };

        let mut messages = Vec::new();
        for item in Grib2Reader::new(data, self.tables.clone()) {
            match item {
                Ok(message) => messages.push(message),
                Err(e) if messages.is_empty() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        messages = messages.len(),
                        error = %e,
                        "Ignoring unreadable remainder of file"
                    );
                    break;
                }
            }
        }

        if messages.is_empty() {
            return Err(ExtractError::NoMessages);
        }
        Ok(messages)
    }

    /// The unfiltered extract. Depth-below-land fields are named
    /// `<param>_<depth>cm`.
    pub fn extract_main(&self, messages: &[Grib2Message]) -> Result<LayerExtract, ExtractError> {
        let selected: Vec<&Grib2Message> = messages.iter().collect();
        self.build_layer(ExtractKind::Main, &selected)
    }

    /// The extract for one soil depth.
    pub fn extract_depth(
        &self,
        messages: &[Grib2Message],
        depth_cm: u32,
        layer: usize,
    ) -> LayerOutcome {
        let selected: Vec<&Grib2Message> = messages
            .iter()
            .filter(|m| at_depth(m, depth_cm))
            .collect();

        if selected.is_empty() {
            return LayerOutcome::Absent {
                reason: format!("no fields at depth {} cm", depth_cm),
            };
        }

        match self.build_layer(ExtractKind::Depth { depth_cm, layer }, &selected) {
            Ok(extract) => LayerOutcome::Present(extract),
            Err(e) => LayerOutcome::Absent {
                reason: e.to_string(),
            },
        }
    }

    /// Merge a depth extract over the main extract.
    ///
    /// The main extract's entries for fields at this depth are taken out
    /// first so the depth extract's names replace them. They are put back
    /// if the merge fails.
    fn merge_depth(
        &self,
        main: &mut Dataset,
        messages: &[Grib2Message],
        depth_cm: u32,
        layer: LayerExtract,
    ) -> Result<Vec<String>, String> {
        let generic: Vec<(String, Variable)> = messages
            .iter()
            .filter(|m| at_depth(m, depth_cm))
            .map(|m| self.variable_name(ExtractKind::Main, m))
            .filter_map(|name| main.remove(&name).map(|variable| (name, variable)))
            .collect();

        match main.merge(layer.dataset) {
            Ok(dropped) => Ok(dropped),
            Err(e) => {
                for (name, variable) in generic {
                    if let Err(restore) = main.insert(name, variable) {
                        debug!(error = %restore, "Could not restore main-layer field");
                    }
                }
                Err(format!("cannot merge with main layer: {}", e))
            }
        }
    }

    fn build_layer(
        &self,
        kind: ExtractKind,
        messages: &[&Grib2Message],
    ) -> Result<LayerExtract, ExtractError> {
        let first = messages.first().ok_or(ExtractError::NoMessages)?;
        let grid = &first.grid_definition;
        let coords = first.coordinates()?;

        let mut dataset = Dataset::new(coords.latitudes, coords.longitudes);
        let mut skipped = 0usize;

        for message in messages {
            let pd = &message.product_definition;

            if !message.grid_definition.same_grid(grid) {
                warn!(
                    extract = %kind,
                    message = message.index,
                    param = %pd.parameter_short_name,
                    "Field is on a different grid, skipping"
                );
                skipped += 1;
                continue;
            }

            let name = self.variable_name(kind, message);
            if dataset.contains(&name) {
                debug!(extract = %kind, variable = %name, "Duplicate field, keeping the first");
                skipped += 1;
                continue;
            }

            let values = match message.unpack_grid() {
                Ok(values) => values,
                Err(e) => {
                    warn!(
                        extract = %kind,
                        message = message.index,
                        param = %pd.parameter_short_name,
                        error = %e,
                        "Failed to unpack field, skipping"
                    );
                    skipped += 1;
                    continue;
                }
            };

            dataset.insert(name, Variable::grid(values, variable_attributes(message)))?;
        }

        if dataset.is_empty() {
            return Err(ExtractError::NoFields {
                attempted: messages.len(),
            });
        }

        dataset.attributes = dataset_attributes(first);

        Ok(LayerExtract {
            kind,
            dataset,
            skipped_messages: skipped,
        })
    }

    /// Variable name of a field within an extract.
    ///
    /// Main fields are `<param>_<level>` (`tmp_2m`, `prmsl`, `soilw_100cm`).
    /// In a depth extract, soil moisture and soil temperature follow the
    /// layer numbering of the depth list (`swvl1`, `stl2`); other fields
    /// carry the depth.
    pub fn variable_name(&self, kind: ExtractKind, message: &Grib2Message) -> String {
        let pd = &message.product_definition;
        let short = pd.parameter_short_name.to_lowercase();

        match kind {
            ExtractKind::Main => {
                let suffix = self.tables.get_level_suffix(pd.level_type, pd.level());
                if suffix.is_empty() {
                    short
                } else {
                    format!("{}_{}", short, suffix)
                }
            }
            ExtractKind::Depth { depth_cm, layer } => match pd.parameter_short_name.as_str() {
                "SOILW" | "VSOILM" => format!("swvl{}", layer),
                "TSOIL" => format!("stl{}", layer),
                _ => format!("{}_{}cm", short, depth_cm),
            },
        }
    }
}

fn at_depth(message: &Grib2Message, depth_cm: u32) -> bool {
    message.is_depth_layer() && message_depth_cm(message) == Some(depth_cm)
}

/// Top depth of a depth-below-land field in centimetres.
fn message_depth_cm(message: &Grib2Message) -> Option<u32> {
    let cm = (message.product_definition.level() * 100.0).round();
    if cm.is_finite() && cm >= 0.0 && cm <= f64::from(u32::MAX) {
        Some(cm as u32)
    } else {
        None
    }
}

fn variable_attributes(message: &Grib2Message) -> Attributes {
    let pd = &message.product_definition;
    let mut attrs = Attributes::new();
    attrs.insert("grib_short_name".to_string(), json!(pd.parameter_short_name));
    attrs.insert(
        "grib_parameter".to_string(),
        json!(format!(
            "{}.{}.{}",
            message.indicator.discipline, pd.parameter_category, pd.parameter_number
        )),
    );
    attrs.insert("level".to_string(), json!(pd.level_description));
    attrs.insert("level_type".to_string(), json!(pd.level_type));
    attrs
}

fn dataset_attributes(message: &Grib2Message) -> Attributes {
    let id = &message.identification;
    let mut attrs = Attributes::new();
    attrs.insert("grib_edition".to_string(), json!(message.indicator.edition));
    attrs.insert("centre".to_string(), json!(id.center));
    attrs.insert("sub_centre".to_string(), json!(id.sub_center));
    attrs.insert(
        "reference_time".to_string(),
        json!(id.reference_time.to_rfc3339()),
    );
    attrs
}

/// Decompress gzip-compressed GRIB2 data.
pub fn decompress_gzip(data: &[u8]) -> io::Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(Bytes::from(decompressed))
}
