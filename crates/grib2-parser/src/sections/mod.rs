//! GRIB2 section parsing.
//!
//! This module handles parsing of individual GRIB2 message sections.
//! Each GRIB2 message consists of multiple sections containing
//! metadata, grid information, and compressed data.
//!
//! Signed quantities in GRIB2 use sign-magnitude encoding (the most
//! significant bit is the sign), not two's complement.

use crate::tables::Grib2Tables;
use crate::Grib2Error;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 3: Grid Definition Section
///
/// Angles are kept in microdegrees, as encoded by template 3.0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridDefinition {
    pub template_number: u16,
    pub grid_shape: u8,
    /// Nj
    pub num_points_latitude: u32,
    /// Ni
    pub num_points_longitude: u32,
    pub first_latitude_microdegrees: i32,
    pub first_longitude_microdegrees: i32,
    pub last_latitude_microdegrees: i32,
    pub last_longitude_microdegrees: i32,
    /// Dj
    pub latitude_increment_microdegrees: u32,
    /// Di
    pub longitude_increment_microdegrees: u32,
    pub scanning_mode: u8,
}

impl GridDefinition {
    /// Total number of grid points.
    pub fn num_points(&self) -> usize {
        self.num_points_latitude as usize * self.num_points_longitude as usize
    }

    /// True when two fields share the same horizontal grid.
    pub fn same_grid(&self, other: &GridDefinition) -> bool {
        self == other
    }
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template_number: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub parameter_short_name: String,
    pub level_type: u8,
    pub level_scale_factor: i8,
    pub level_scaled_value: u32,
    pub level_description: String,
    pub forecast_hour: u32,
}

impl ProductDefinition {
    /// Level value of the first fixed surface with its scale factor applied.
    pub fn level(&self) -> f64 {
        scaled_level(self.level_scale_factor, self.level_scaled_value)
    }
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    pub num_data_points: u32,
    pub template_number: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octets 1-4: "GRIB", 5-6: reserved, 7: discipline, 8: edition,
    // 9-16: total message length (8-byte big-endian)
    let discipline = data[6];
    let edition = data[7];

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    let message_length = u64::from_be_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Parse Section 1 (Identification)
pub fn parse_identification(data: &[u8]) -> Result<Identification, Grib2Error> {
    let section_offset = find_section(data, 1)?;
    let section = &data[section_offset..];

    if section.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: "Not enough data".to_string(),
        });
    }

    // Skip section length (4 bytes) and section number (1 byte)
    let sec_data = &section[5..];

    let center = u16::from_be_bytes([sec_data[0], sec_data[1]]);
    let sub_center = u16::from_be_bytes([sec_data[2], sec_data[3]]);
    let table_version = sec_data[4];
    let local_table_version = sec_data[5];
    let significance_of_reference_time = sec_data[6];

    let year = u16::from_be_bytes([sec_data[7], sec_data[8]]);
    let month = sec_data[9];
    let day = sec_data[10];
    let hour = sec_data[11];
    let minute = sec_data[12];
    let second = sec_data[13];

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    let reference_time = DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc);

    let production_status = sec_data.get(14).copied().unwrap_or(0);
    let data_type = sec_data.get(15).copied().unwrap_or(0);

    Ok(Identification {
        center,
        sub_center,
        table_version,
        local_table_version,
        significance_of_reference_time,
        reference_time,
        production_status,
        data_type,
    })
}

/// Parse Section 3 (Grid Definition)
///
/// Only template 3.0 (regular latitude/longitude) is fully decoded. Other
/// templates are rejected, since the pipeline needs real coordinates.
pub fn parse_grid_definition(data: &[u8]) -> Result<GridDefinition, Grib2Error> {
    let section_offset = find_section(data, 3)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    // Bytes 0-3: length, 4: section number, 5: source of grid definition,
    // 6-9: number of data points, 10-11: optional list, 12-13: template
    let grid_template = u16::from_be_bytes([section_data[12], section_data[13]]);

    if grid_template != 0 {
        return Err(Grib2Error::Unsupported(format!(
            "grid definition template 3.{}",
            grid_template
        )));
    }

    let gd = &section_data[14..];

    // Template 3.0 layout (offsets relative to template start):
    //  0      shape of the earth
    //  16-19  Ni, 20-23 Nj
    //  32-35  La1, 36-39 Lo1, 40 resolution flags
    //  41-44  La2, 45-48 Lo2
    //  49-52  Di, 53-56 Dj, 57 scanning mode
    if gd.len() < 58 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Template 0 needs at least 58 bytes, got {}", gd.len()),
        });
    }

    let grid_shape = gd[0];
    let ni = u32::from_be_bytes([gd[16], gd[17], gd[18], gd[19]]);
    let nj = u32::from_be_bytes([gd[20], gd[21], gd[22], gd[23]]);

    let la1 = decode_grib2_signed(&gd[32..36]);
    let lo1 = decode_grib2_signed(&gd[36..40]);
    let la2 = decode_grib2_signed(&gd[41..45]);
    let lo2 = decode_grib2_signed(&gd[45..49]);
    let di = u32::from_be_bytes([gd[49], gd[50], gd[51], gd[52]]);
    let dj = u32::from_be_bytes([gd[53], gd[54], gd[55], gd[56]]);
    let scanning_mode = gd[57];

    if ni == 0 || nj == 0 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Empty grid {}x{}", ni, nj),
        });
    }

    Ok(GridDefinition {
        template_number: grid_template,
        grid_shape,
        num_points_latitude: nj,
        num_points_longitude: ni,
        first_latitude_microdegrees: la1,
        first_longitude_microdegrees: lo1,
        last_latitude_microdegrees: la2,
        last_longitude_microdegrees: lo2,
        latitude_increment_microdegrees: dj,
        longitude_increment_microdegrees: di,
        scanning_mode,
    })
}

/// Parse Section 4 (Product Definition)
pub fn parse_product_definition(
    data: &[u8],
    discipline: u8,
    tables: &Grib2Tables,
) -> Result<ProductDefinition, Grib2Error> {
    let section_offset = find_section(data, 4)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 28 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "Not enough data".to_string(),
        });
    }

    // Bytes 0-3: length, 4: section number, 5-6: coordinate values,
    // 7-8: template, 9: category, 10: number.
    // Template 4.0 continues with 17: time unit, 18-21: forecast time,
    // 22: first surface type, 23: scale factor, 24-27: scaled value.
    let template_number = u16::from_be_bytes([section_data[7], section_data[8]]);
    let parameter_category = section_data[9];
    let parameter_number = section_data[10];

    let time_unit = section_data[17];
    let forecast_time = u32::from_be_bytes([
        section_data[18],
        section_data[19],
        section_data[20],
        section_data[21],
    ]);
    let forecast_hour = match time_unit {
        0 => forecast_time / 60,
        2 => forecast_time.saturating_mul(24),
        // Hours, and anything we don't convert
        _ => forecast_time,
    };

    let level_type = section_data[22];
    let raw_scale = section_data[23];
    let raw_value = u32::from_be_bytes([
        section_data[24],
        section_data[25],
        section_data[26],
        section_data[27],
    ]);

    // All bits set means "missing"
    let (level_scale_factor, level_scaled_value) = if raw_scale == 0xFF || raw_value == u32::MAX {
        (0, 0)
    } else {
        (decode_grib2_signed_i8(raw_scale), raw_value)
    };

    let parameter_short_name =
        tables.get_parameter_name(discipline, parameter_category, parameter_number);
    let level_description = tables.get_level_description(
        level_type,
        scaled_level(level_scale_factor, level_scaled_value),
    );

    Ok(ProductDefinition {
        template_number,
        parameter_category,
        parameter_number,
        parameter_short_name,
        level_type,
        level_scale_factor,
        level_scaled_value,
        level_description,
        forecast_hour,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(data: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    let section_offset = find_section(data, 5)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "Not enough data".to_string(),
        });
    }

    // Octets 6-9 [5-8]: number of packed values
    // Octets 10-11 [9-10]: template number
    // Template 5.0 (shared prefix with 5.2, 5.3, 5.40, 5.41):
    // [11-14] reference value (IEEE float), [15-16] binary scale,
    // [17-18] decimal scale, [19] bits per value, [20] original type
    let num_data_points = u32::from_be_bytes([
        section_data[5],
        section_data[6],
        section_data[7],
        section_data[8],
    ]);
    let template_number = u16::from_be_bytes([section_data[9], section_data[10]]);

    let reference_value = f32::from_be_bytes([
        section_data[11],
        section_data[12],
        section_data[13],
        section_data[14],
    ]);
    let binary_scale_factor = decode_grib2_signed_i16(&section_data[15..17]);
    let decimal_scale_factor = decode_grib2_signed_i16(&section_data[17..19]);
    let bits_per_value = section_data[19];
    let original_data_type = section_data[20];

    Ok(DataRepresentation {
        num_data_points,
        template_number,
        reference_value,
        binary_scale_factor,
        decimal_scale_factor,
        bits_per_value,
        original_data_type,
    })
}

/// Parse Section 6 (Bitmap)
///
/// Returns `None` when the message declares that no bitmap applies.
pub fn parse_bitmap(data: &[u8]) -> Result<Option<Bitmap>, Grib2Error> {
    let section_offset = find_section(data, 6)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "Not enough data".to_string(),
        });
    }

    let section_length = section_length(section_data);
    let indicator = section_data[5];

    match indicator {
        255 => Ok(None),
        0 => {
            let bitmap_data = if section_length > 6 {
                Bytes::copy_from_slice(&section_data[6..section_length])
            } else {
                Bytes::new()
            };
            Ok(Some(Bitmap {
                indicator,
                data: bitmap_data,
            }))
        }
        other => Err(Grib2Error::Unsupported(format!(
            "bitmap indicator {}",
            other
        ))),
    }
}

/// Parse Section 7 (Data)
pub fn parse_data_section(data: &[u8]) -> Result<DataSection, Grib2Error> {
    let section_offset = find_section(data, 7)?;
    let section_data = &data[section_offset..];

    if section_data.len() < 5 {
        return Err(Grib2Error::InvalidSection {
            section: 7,
            reason: "Not enough data".to_string(),
        });
    }

    let section_length = section_length(section_data);

    if section_length > section_data.len() {
        return Err(Grib2Error::InvalidSection {
            section: 7,
            reason: "Section length exceeds available data".to_string(),
        });
    }

    let data_bytes = if section_length > 5 {
        Bytes::copy_from_slice(&section_data[5..section_length])
    } else {
        Bytes::new()
    };

    Ok(DataSection { data: data_bytes })
}

// ===== Helper Functions =====

/// Decode a 4-byte GRIB2 sign-magnitude integer.
///
/// Returns 0 for input that is not exactly 4 bytes long.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    if bytes.len() != 4 {
        return 0;
    }
    let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a 2-byte GRIB2 sign-magnitude integer.
pub fn decode_grib2_signed_i16(bytes: &[u8]) -> i16 {
    if bytes.len() != 2 {
        return 0;
    }
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn decode_grib2_signed_i8(raw: u8) -> i8 {
    let magnitude = (raw & 0x7F) as i8;
    if raw & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Apply a GRIB2 scale factor: value = scaled_value * 10^-scale_factor
fn scaled_level(scale_factor: i8, scaled_value: u32) -> f64 {
    scaled_value as f64 * 10f64.powi(-(scale_factor as i32))
}

fn section_length(section_data: &[u8]) -> usize {
    u32::from_be_bytes([
        section_data[0],
        section_data[1],
        section_data[2],
        section_data[3],
    ]) as usize
}

/// Find a section by number within a message
fn find_section(data: &[u8], section_num: u8) -> Result<usize, Grib2Error> {
    let mut offset = 16; // After Section 0

    loop {
        if offset + 4 <= data.len() && &data[offset..offset + 4] == b"7777" {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Reached end of message without finding section".to_string(),
            });
        }

        if offset + 5 > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Section not found".to_string(),
            });
        }

        let length = section_length(&data[offset..]);

        if length < 5 || offset + length > data.len() {
            return Err(Grib2Error::InvalidSection {
                section: section_num,
                reason: "Invalid section length".to_string(),
            });
        }

        let current_section = data[offset + 4];

        if current_section == section_num {
            return Ok(offset);
        }

        offset += length;
    }
}
