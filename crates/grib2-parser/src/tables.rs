//! GRIB2 parameter and level lookup tables.
//!
//! Translates GRIB2 numeric codes into short parameter names and level
//! descriptions. `Grib2Tables::standard()` covers the WMO/NCEP codes found
//! in the model output we ingest; callers can extend it at runtime.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Level description - either static text or a template with placeholders
#[derive(Debug, Clone)]
pub enum LevelDescription {
    /// Static description (e.g., "surface", "mean sea level")
    Static(String),
    /// Template (e.g., "{value_mb} mb", "{value} m above ground")
    Template(String),
}

impl LevelDescription {
    /// Format the level description, substituting placeholders if it's a template.
    ///
    /// Supported placeholders:
    /// - `{value}` - level value as decoded (e.g., 85000 for 850 mb in Pa)
    /// - `{value_mb}` - value converted from Pa to mb
    /// - `{value_cm}` - value converted from m to cm
    pub fn format(&self, value: f64) -> String {
        match self {
            LevelDescription::Static(s) => s.clone(),
            LevelDescription::Template(t) => t
                .replace("{value}", &format_level_value(value))
                .replace("{value_mb}", &format_level_value(value / 100.0))
                .replace("{value_cm}", &format_level_value((value * 100.0).round())),
        }
    }
}

/// Render a level value without a trailing ".0" for whole numbers.
fn format_level_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// GRIB2 parameter and level lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    /// (discipline, category, number) -> parameter short name (e.g., "TMP", "UGRD")
    parameters: HashMap<ParamKey, String>,
    /// level_type -> description pattern
    levels: HashMap<u8, LevelDescription>,
    /// level_type -> compact suffix used in variable names ("" for single-level types)
    level_suffixes: HashMap<u8, LevelDescription>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables preloaded with the WMO and NCEP local codes used by the
    /// forecast models we ingest.
    pub fn standard() -> Self {
        let mut tables = Self::new();

        let parameters: &[(u8, u8, u8, &str)] = &[
            // Meteorological: temperature
            (0, 0, 0, "TMP"),
            (0, 0, 2, "POT"),
            (0, 0, 4, "TMAX"),
            (0, 0, 5, "TMIN"),
            (0, 0, 6, "DPT"),
            // Moisture
            (0, 1, 0, "SPFH"),
            (0, 1, 1, "RH"),
            (0, 1, 3, "PWAT"),
            (0, 1, 7, "PRATE"),
            (0, 1, 8, "APCP"),
            (0, 1, 11, "SNOD"),
            (0, 1, 13, "WEASD"),
            // Momentum
            (0, 2, 1, "WIND"),
            (0, 2, 2, "UGRD"),
            (0, 2, 3, "VGRD"),
            (0, 2, 8, "VVEL"),
            (0, 2, 22, "GUST"),
            // Mass
            (0, 3, 0, "PRES"),
            (0, 3, 1, "PRMSL"),
            (0, 3, 5, "HGT"),
            // Radiation and cloud
            (0, 4, 192, "DSWRF"),
            (0, 5, 192, "DLWRF"),
            (0, 6, 1, "TCDC"),
            // Stability
            (0, 7, 6, "CAPE"),
            (0, 7, 7, "CIN"),
            // Physical atmospheric properties
            (0, 19, 0, "VIS"),
            (0, 16, 196, "REFC"),
            // Land surface
            (2, 0, 0, "LAND"),
            (2, 0, 25, "VSOILM"),
            (2, 0, 192, "SOILW"),
            (2, 3, 18, "TSOIL"),
            // Oceanographic
            (10, 2, 0, "ICEC"),
        ];
        for (discipline, category, number, name) in parameters {
            tables.add_parameter(*discipline, *category, *number, name.to_string());
        }

        let levels: &[(u8, LevelDescription, LevelDescription)] = &[
            (
                1,
                LevelDescription::Static("surface".to_string()),
                LevelDescription::Static(String::new()),
            ),
            (
                2,
                LevelDescription::Static("cloud base".to_string()),
                LevelDescription::Static("cloudbase".to_string()),
            ),
            (
                3,
                LevelDescription::Static("cloud top".to_string()),
                LevelDescription::Static("cloudtop".to_string()),
            ),
            (
                100,
                LevelDescription::Template("{value_mb} mb".to_string()),
                LevelDescription::Template("{value_mb}mb".to_string()),
            ),
            (
                101,
                LevelDescription::Static("mean sea level".to_string()),
                LevelDescription::Static(String::new()),
            ),
            (
                103,
                LevelDescription::Template("{value} m above ground".to_string()),
                LevelDescription::Template("{value}m".to_string()),
            ),
            (
                106,
                LevelDescription::Template("{value} m below land surface".to_string()),
                LevelDescription::Template("{value_cm}cm".to_string()),
            ),
            (
                200,
                LevelDescription::Static("entire atmosphere".to_string()),
                LevelDescription::Static(String::new()),
            ),
        ];
        for (level_type, description, suffix) in levels {
            tables.add_level(*level_type, description.clone());
            tables.add_level_suffix(*level_type, suffix.clone());
        }

        tables
    }

    /// Add a parameter mapping
    ///
    /// # Arguments
    /// * `discipline` - GRIB2 discipline code
    /// * `category` - Parameter category within discipline
    /// * `number` - Parameter number within category
    /// * `name` - Short parameter name (e.g., "TMP", "UGRD")
    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.parameters.insert((discipline, category, number), name);
    }

    /// Add a level description mapping
    pub fn add_level(&mut self, level_type: u8, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    /// Add the compact variable-name suffix for a level type.
    pub fn add_level_suffix(&mut self, level_type: u8, suffix: LevelDescription) {
        self.level_suffixes.insert(level_type, suffix);
    }

    /// Look up parameter short name by GRIB2 codes.
    ///
    /// Returns "P{discipline}_{category}_{number}" if not found.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    /// Look up level description by type code and value.
    ///
    /// Returns "Level type {type} value {value}" if not found.
    pub fn get_level_description(&self, level_type: u8, level_value: f64) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!(
                "Level type {} value {}",
                level_type,
                format_level_value(level_value)
            ),
        }
    }

    /// Compact level suffix for variable names, e.g. "850mb" or "2m".
    ///
    /// Empty for single-level types such as the surface. Unknown types fall
    /// back to "l{type}_{value}".
    pub fn get_level_suffix(&self, level_type: u8, level_value: f64) -> String {
        match self.level_suffixes.get(&level_type) {
            Some(suffix) => suffix.format(level_value),
            None => format!("l{}_{}", level_type, format_level_value(level_value)),
        }
    }

    /// Get the number of parameters in the table
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Get the number of level types in the table
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Check if the tables are empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_parameter_lookup() {
        let tables = Grib2Tables::standard();

        assert_eq!(tables.get_parameter_name(0, 0, 0), "TMP");
        assert_eq!(tables.get_parameter_name(0, 2, 2), "UGRD");
        assert_eq!(tables.get_parameter_name(0, 3, 1), "PRMSL");
        assert_eq!(tables.get_parameter_name(2, 0, 192), "SOILW");
        assert_eq!(tables.get_parameter_name(2, 3, 18), "TSOIL");
    }

    #[test]
    fn test_parameter_not_found() {
        let tables = Grib2Tables::standard();

        assert_eq!(tables.get_parameter_name(99, 99, 99), "P99_99_99");
        assert_eq!(tables.get_parameter_name(0, 0, 99), "P0_0_99");
    }

    #[test]
    fn test_level_descriptions() {
        let tables = Grib2Tables::standard();

        assert_eq!(tables.get_level_description(1, 0.0), "surface");
        assert_eq!(tables.get_level_description(100, 85000.0), "850 mb");
        assert_eq!(tables.get_level_description(103, 2.0), "2 m above ground");
        assert_eq!(
            tables.get_level_description(106, 0.07),
            "0.07 m below land surface"
        );
        assert_eq!(
            tables.get_level_description(99, 123.0),
            "Level type 99 value 123"
        );
    }

    #[test]
    fn test_level_suffixes() {
        let tables = Grib2Tables::standard();

        assert_eq!(tables.get_level_suffix(1, 0.0), "");
        assert_eq!(tables.get_level_suffix(100, 50000.0), "500mb");
        assert_eq!(tables.get_level_suffix(103, 10.0), "10m");
        assert_eq!(tables.get_level_suffix(106, 0.28), "28cm");
        assert_eq!(tables.get_level_suffix(150, 3.0), "l150_3");
    }

    #[test]
    fn test_runtime_extension() {
        let mut tables = Grib2Tables::standard();
        tables.add_parameter(209, 0, 16, "REFL".to_string());
        assert_eq!(tables.get_parameter_name(209, 0, 16), "REFL");
    }

    #[test]
    fn test_empty_tables() {
        let tables = Grib2Tables::new();

        assert_eq!(tables.parameter_count(), 0);
        assert_eq!(tables.level_count(), 0);
        assert!(tables.is_empty());
        assert_eq!(tables.get_parameter_name(0, 0, 0), "P0_0_0");
        assert_eq!(tables.get_level_description(1, 0.0), "Level type 1 value 0");
    }
}
