//! Synthetic GRIB2 message builder.
//!
//! Produces small, structurally valid GRIB2 messages (grid template 3.0,
//! product template 4.0, simple packing 5.0) so parser and pipeline tests
//! do not depend on downloaded model output.
//!
//! NaN entries in the data are written as bitmap-masked points.

use std::fs;
use std::path::{Path, PathBuf};

/// GRIB2 "depth below land surface" level type.
pub const DEPTH_BELOW_LAND: u8 = 106;

/// Build a single GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    // Grid definition
    ni: u32,
    nj: u32,
    la1: i32, // microdegrees
    lo1: i32,
    la2: i32,
    lo2: i32,
    di: u32,
    dj: u32,
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_scale_factor: i8,
    level_value: u32,
    forecast_hour: u32,
    // Data, in message scan order
    data_values: Vec<f32>,
}

impl Grib2Builder {
    /// 2 m temperature on a 3x8 global band (lat 10..-10, lon 0..315).
    pub fn new() -> Self {
        let ni = 8;
        let nj = 3;
        Self {
            discipline: 0,
            center: 7,
            year: 2024,
            month: 1,
            day: 15,
            hour: 0,
            ni,
            nj,
            la1: 10_000_000,
            lo1: 0,
            la2: -10_000_000,
            lo2: 315_000_000,
            di: 45_000_000,
            dj: 10_000_000,
            scanning_mode: 0b0000_0000, // +i, -j, i consecutive
            param_category: 0,
            param_number: 0,
            level_type: 103,
            level_scale_factor: 0,
            level_value: 2,
            forecast_hour: 0,
            data_values: crate::generators::create_temperature_grid(ni as usize, nj as usize),
        }
    }

    /// Volumetric soil moisture on a depth-below-land layer.
    pub fn soil_moisture(depth_cm: u32) -> Self {
        Self::new()
            .with_discipline(2)
            .with_parameter(0, 192)
            .with_depth_cm(depth_cm)
            .with_constant_value(0.25)
    }

    /// Soil temperature on a depth-below-land layer.
    pub fn soil_temperature(depth_cm: u32) -> Self {
        Self::new()
            .with_discipline(2)
            .with_parameter(3, 18)
            .with_depth_cm(depth_cm)
            .with_constant_value(280.0)
    }

    pub fn with_discipline(mut self, discipline: u8) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    /// Set grid dimensions; resets the data to zeros.
    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    /// Set the grid corners and increments, in degrees.
    pub fn with_extent(
        mut self,
        first_lat: f64,
        first_lon: f64,
        last_lat: f64,
        last_lon: f64,
        lon_step: f64,
        lat_step: f64,
    ) -> Self {
        self.la1 = to_micro(first_lat);
        self.lo1 = to_micro(first_lon);
        self.la2 = to_micro(last_lat);
        self.lo2 = to_micro(last_lon);
        self.di = to_micro(lon_step).unsigned_abs();
        self.dj = to_micro(lat_step).unsigned_abs();
        self
    }

    pub fn with_scanning_mode(mut self, scanning_mode: u8) -> Self {
        self.scanning_mode = scanning_mode;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    /// Set the first fixed surface as (type, scale factor, scaled value).
    pub fn with_level(mut self, level_type: u8, scale_factor: i8, scaled_value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale_factor = scale_factor;
        self.level_value = scaled_value;
        self
    }

    /// Depth-below-land layer encoded in centimetres (value * 10^-2 m).
    pub fn with_depth_cm(self, depth_cm: u32) -> Self {
        self.with_level(DEPTH_BELOW_LAND, 2, depth_cm)
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Raw values in message scan order. NaN marks a missing point.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let sections = [
            self.build_section1(),
            self.build_section3(),
            self.build_section4(),
            self.build_section5(),
            self.build_section6(),
            self.build_section7(),
        ];

        let message_length: usize = 16 + sections.iter().map(Vec::len).sum::<usize>() + 4;

        let mut message = Vec::with_capacity(message_length);

        // Section 0: Indicator
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());

        for section in &sections {
            message.extend_from_slice(section);
        }

        // Section 8: End
        message.extend_from_slice(b"7777");

        message
    }

    fn present_values(&self) -> Vec<f32> {
        self.data_values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect()
    }

    fn has_missing(&self) -> bool {
        self.data_values.iter().any(|v| v.is_nan())
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);

        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Start of forecast

        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(0);
        section.push(0);

        section.push(0); // Operational
        section.push(1); // Forecast

        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let section_length: u32 = 14 + 58;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(3);

        section.push(0); // Source of grid definition
        section.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        section.push(0);
        section.push(0);
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 3.0

        section.push(6); // Shape of Earth
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section.extend_from_slice(&self.ni.to_be_bytes());
        section.extend_from_slice(&self.nj.to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions

        section.extend_from_slice(&encode_signed(self.la1));
        section.extend_from_slice(&encode_signed(self.lo1));
        section.push(48); // Resolution and component flags
        section.extend_from_slice(&encode_signed(self.la2));
        section.extend_from_slice(&encode_signed(self.lo2));
        section.extend_from_slice(&self.di.to_be_bytes());
        section.extend_from_slice(&self.dj.to_be_bytes());
        section.push(self.scanning_mode);

        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&34u32.to_be_bytes());
        section.push(4);

        section.extend_from_slice(&0u16.to_be_bytes()); // Coordinate values
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 4.0

        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // Forecast
        section.push(0);
        section.push(0);
        section.extend_from_slice(&0u16.to_be_bytes());
        section.push(0);
        section.push(1); // Hours
        section.extend_from_slice(&self.forecast_hour.to_be_bytes());

        section.push(self.level_type);
        section.push(encode_signed_i8(self.level_scale_factor));
        section.extend_from_slice(&self.level_value.to_be_bytes());

        section.push(255); // No second surface
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section
    }

    fn packing(&self) -> (f32, u8, i16) {
        let present = self.present_values();
        let (min_val, max_val) = present
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
                (min.min(v), max.max(v))
            });

        if present.is_empty() {
            return (0.0, 0, 0);
        }

        let range = max_val - min_val;
        if range == 0.0 {
            return (min_val, 0, 0);
        }

        // value = reference + packed * 2^E, with 16-bit packed values
        let binary_scale_factor = (range / 65535.0).log2().ceil() as i16;
        (min_val, 16, binary_scale_factor)
    }

    fn build_section5(&self) -> Vec<u8> {
        let (reference_value, bits_per_value, binary_scale_factor) = self.packing();

        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);

        section.extend_from_slice(&(self.present_values().len() as u32).to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0

        section.extend_from_slice(&reference_value.to_be_bytes());
        section.extend_from_slice(&encode_signed_i16(binary_scale_factor));
        section.extend_from_slice(&encode_signed_i16(0)); // Decimal scale factor
        section.push(bits_per_value);
        section.push(0); // Floating point

        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut section = Vec::new();

        if !self.has_missing() {
            section.extend_from_slice(&6u32.to_be_bytes());
            section.push(6);
            section.push(255);
            return section;
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, value) in self.data_values.iter().enumerate() {
            if !value.is_nan() {
                bitmap[i / 8] |= 1 << (7 - (i % 8));
            }
        }

        section.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        section.push(6);
        section.push(0);
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let (reference_value, bits_per_value, binary_scale_factor) = self.packing();

        let mut packed = Vec::new();
        if bits_per_value > 0 {
            let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
            for value in self.present_values() {
                let packed_value =
                    ((value as f64 - reference_value as f64) / binary_scale).round() as u16;
                packed.extend_from_slice(&packed_value.to_be_bytes());
            }
        }

        let mut section = Vec::new();
        section.extend_from_slice(&(5 + packed.len() as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packed);
        section
    }
}

impl Default for Grib2Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate messages into the bytes of one GRIB2 file.
pub fn grib2_file(messages: &[Grib2Builder]) -> Vec<u8> {
    messages.iter().flat_map(|m| m.build()).collect()
}

/// Write a multi-message GRIB2 file into `dir` and return its path.
pub fn write_grib2_file(dir: &Path, name: &str, messages: &[Grib2Builder]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, grib2_file(messages)).expect("write synthetic GRIB2 file");
    path
}

fn to_micro(degrees: f64) -> i32 {
    (degrees * 1_000_000.0).round() as i32
}

/// GRIB2 sign-magnitude encoding of a 32-bit integer.
fn encode_signed(value: i32) -> [u8; 4] {
    let magnitude = value.unsigned_abs() & 0x7FFF_FFFF;
    let raw = if value < 0 {
        magnitude | 0x8000_0000
    } else {
        magnitude
    };
    raw.to_be_bytes()
}

fn encode_signed_i16(value: i16) -> [u8; 2] {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    let raw = if value < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

fn encode_signed_i8(value: i8) -> u8 {
    let magnitude = value.unsigned_abs() & 0x7F;
    if value < 0 {
        magnitude | 0x80
    } else {
        magnitude
    }
}
