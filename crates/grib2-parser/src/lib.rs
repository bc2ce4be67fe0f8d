//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! This crate reads the forecast-model files consumed by the ingestion
//! pipeline. A file is a concatenation of GRIB2 messages; each message is
//! parsed into its sections and can be unpacked into a row-major grid with
//! matching latitude/longitude coordinates.
//!
//! Simple packing (template 5.0) is decoded natively. Other packing
//! templates are handed to the `grib` crate decoder.

pub mod grid;
pub mod sections;
pub mod tables;
pub mod unpacking;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

pub use grid::GridCoordinates;
pub use sections::{
    Bitmap, DataRepresentation, DataSection, GridDefinition, Identification, Indicator,
    ProductDefinition,
};
pub use tables::{Grib2Tables, LevelDescription};

/// GRIB2 fixed surface type for layers below the land surface.
pub const DEPTH_BELOW_LAND_LAYER: u8 = 106;

/// Errors raised while reading GRIB2 data.
#[derive(Error, Debug)]
pub enum Grib2Error {
    #[error("invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("truncated message at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unpacking failed: {0}")]
    UnpackingError(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// One parsed GRIB2 message.
///
/// Only the first field of a message is decoded; multi-field messages
/// (repeated sections 2-7) are rare in the model output we ingest.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    /// Zero-based position of the message within its file.
    pub index: usize,
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub bitmap: Option<Bitmap>,
    pub data_section: DataSection,
    /// Raw bytes of the whole message, kept for the fallback decoder.
    pub raw: Bytes,
}

impl Grib2Message {
    /// Unpack the field values in the order they are stored in the message.
    ///
    /// Points masked out by the bitmap come back as NaN.
    pub fn unpack_data(&self) -> Result<Vec<f32>, Grib2Error> {
        let num_points = self.grid_definition.num_points() as u32;

        if self.data_representation.template_number != 0 {
            debug!(
                message = self.index,
                template = self.data_representation.template_number,
                "Non-simple packing, using fallback decoder"
            );
            return unpacking::unpack_with_grib_crate(&self.raw);
        }

        let values = unpacking::unpack_simple(
            &self.data_section.data,
            num_points,
            self.data_representation.bits_per_value,
            self.data_representation.reference_value,
            self.data_representation.binary_scale_factor,
            self.data_representation.decimal_scale_factor,
            self.bitmap.as_ref().map(|b| b.data.as_ref()),
        )?;

        Ok(values.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }

    /// Unpack the field as a row-major `[lat][lon]` grid.
    pub fn unpack_grid(&self) -> Result<Vec<f32>, Grib2Error> {
        let values = self.unpack_data()?;
        grid::to_row_major(values, &self.grid_definition)
    }

    /// Latitude/longitude coordinates of the grid, in degrees.
    pub fn coordinates(&self) -> Result<GridCoordinates, Grib2Error> {
        GridCoordinates::from_definition(&self.grid_definition)
    }

    /// True when this field lies on a depth-below-land layer.
    pub fn is_depth_layer(&self) -> bool {
        self.product_definition.level_type == DEPTH_BELOW_LAND_LAYER
    }
}

/// Sequential reader over the messages of a GRIB2 file.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
    index: usize,
    tables: Grib2Tables,
}

impl Grib2Reader {
    /// Create a reader over the full contents of a file.
    pub fn new(data: Bytes, tables: Grib2Tables) -> Self {
        Self {
            data,
            offset: 0,
            index: 0,
            tables,
        }
    }

    /// Read the next message, or `None` once the data is exhausted.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>, Grib2Error> {
        let start = match find_magic(&self.data, self.offset) {
            Some(pos) => pos,
            None => {
                self.offset = self.data.len();
                return Ok(None);
            }
        };

        let available = self.data.len() - start;
        if available < 16 {
            return Err(Grib2Error::Truncated {
                offset: start,
                needed: 16,
                available,
            });
        }

        let indicator = sections::parse_indicator(&self.data[start..])?;
        let length = usize::try_from(indicator.message_length).map_err(|_| {
            Grib2Error::InvalidFormat(format!(
                "message length {} does not fit in memory",
                indicator.message_length
            ))
        })?;

        if length < 16 + 4 {
            return Err(Grib2Error::InvalidFormat(format!(
                "message length {} is shorter than the fixed sections",
                length
            )));
        }
        if length > available {
            return Err(Grib2Error::Truncated {
                offset: start,
                needed: length,
                available,
            });
        }

        let raw = self.data.slice(start..start + length);
        if &raw[length - 4..] != b"7777" {
            return Err(Grib2Error::InvalidFormat(format!(
                "message {} at offset {} is missing its end section",
                self.index, start
            )));
        }

        let message = self.parse_message(indicator, raw)?;

        self.offset = start + length;
        self.index += 1;

        Ok(Some(message))
    }

    /// Read every remaining message.
    pub fn read_all(mut self) -> Result<Vec<Grib2Message>, Grib2Error> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }

    fn parse_message(&self, indicator: Indicator, raw: Bytes) -> Result<Grib2Message, Grib2Error> {
        let identification = sections::parse_identification(&raw)?;
        let grid_definition = sections::parse_grid_definition(&raw)?;
        let product_definition =
            sections::parse_product_definition(&raw, indicator.discipline, &self.tables)?;
        let data_representation = sections::parse_data_representation(&raw)?;
        let bitmap = sections::parse_bitmap(&raw)?;
        let data_section = sections::parse_data_section(&raw)?;

        Ok(Grib2Message {
            index: self.index,
            indicator,
            identification,
            grid_definition,
            product_definition,
            data_representation,
            bitmap,
            data_section,
            raw,
        })
    }
}

impl Iterator for Grib2Reader {
    type Item = Result<Grib2Message, Grib2Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first structural error; offsets past it are unreliable.
                self.offset = self.data.len();
                Some(Err(e))
            }
        }
    }
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(4)
        .position(|w| w == b"GRIB")
        .map(|pos| from + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_magic() {
        let data = b"xxGRIByyGRIB";
        assert_eq!(find_magic(data, 0), Some(2));
        assert_eq!(find_magic(data, 3), Some(8));
        assert_eq!(find_magic(data, 9), None);
        assert_eq!(find_magic(data, 100), None);
    }

    #[test]
    fn test_empty_input_has_no_messages() {
        let mut reader = Grib2Reader::new(Bytes::new(), Grib2Tables::standard());
        assert!(reader.next_message().unwrap().is_none());
    }

    #[test]
    fn test_truncated_indicator() {
        let mut reader = Grib2Reader::new(Bytes::from_static(b"GRIB\0\0"), Grib2Tables::new());
        let err = reader.next_message().unwrap_err();
        assert!(matches!(err, Grib2Error::Truncated { .. }));
    }
}
