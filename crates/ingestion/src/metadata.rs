//! Filename metadata for forecast source files.
//!
//! Source files are named `<prefix>.<...>.<YYYYMMDD>.<HHz>.<FFFh>.grib2`
//! (optionally gzip-compressed with a trailing `.gz`). The three segments
//! before the extension carry the initialization date, the initialization
//! hour and the forecast step.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use thiserror::Error;
use tracing::info;

/// Minimum number of `.`-separated segments in a source file name.
pub const MIN_SEGMENTS: usize = 6;

/// Detected file type based on extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// GRIB2 format
    Grib2,
    /// Gzip-compressed GRIB2
    Grib2Gz,
    /// Anything else
    Unknown,
}

/// Detect file type from path.
pub fn detect_file_type(path: &Path) -> FileType {
    let lower = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if lower.ends_with(".grib2.gz") || lower.ends_with(".grb2.gz") {
        FileType::Grib2Gz
    } else if lower.ends_with(".grib2") || lower.ends_with(".grb2") {
        FileType::Grib2
    } else {
        FileType::Unknown
    }
}

/// Why a file name could not be turned into a [`SourceFile`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    #[error("file name is not valid UTF-8")]
    NotUtf8,

    #[error("expected at least {required} '.'-separated segments, found {found}")]
    TooFewSegments { found: usize, required: usize },

    #[error("invalid initialization date '{0}' (expected YYYYMMDD)")]
    InvalidDate(String),

    #[error("invalid initialization hour '{0}' (expected HHz)")]
    InvalidHour(String),

    #[error("invalid forecast step '{0}' (expected FFFh)")]
    InvalidStep(String),
}

/// A source file with the times encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub init_time: DateTime<Utc>,
    pub forecast_hours: u32,
    /// `init_time + forecast_hours`
    pub valid_time: DateTime<Utc>,
}

impl SourceFile {
    /// File name for logs and reports.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn is_gzip(&self) -> bool {
        detect_file_type(&self.path) == FileType::Grib2Gz
    }
}

/// Parse the initialization time and forecast step from a file's name.
///
/// Only the file name is inspected; directories in `path` may contain dots.
pub fn parse_source_file(path: &Path) -> Result<SourceFile, FilenameError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(FilenameError::NotUtf8)?;
    let name = strip_suffix_ignore_case(file_name, ".gz").unwrap_or(file_name);

    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() < MIN_SEGMENTS {
        return Err(FilenameError::TooFewSegments {
            found: segments.len(),
            required: MIN_SEGMENTS,
        });
    }

    let n = segments.len();
    let (date, hour, step) = (segments[n - 4], segments[n - 3], segments[n - 2]);

    let init_date = parse_date(date)?;
    let init_hour = parse_hour(hour)?;
    let forecast_hours = parse_step(step)?;

    let init_time = init_date
        .and_hms_opt(init_hour, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| FilenameError::InvalidHour(hour.to_string()))?;
    let valid_time = init_time + Duration::hours(i64::from(forecast_hours));

    Ok(SourceFile {
        path: path.to_path_buf(),
        init_time,
        forecast_hours,
        valid_time,
    })
}

fn parse_date(segment: &str) -> Result<NaiveDate, FilenameError> {
    let invalid = || FilenameError::InvalidDate(segment.to_string());
    if segment.len() != 8 || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(segment, "%Y%m%d").map_err(|_| invalid())
}

fn parse_hour(segment: &str) -> Result<u32, FilenameError> {
    let invalid = || FilenameError::InvalidHour(segment.to_string());
    let digits = strip_suffix_ignore_case(segment, "z").unwrap_or(segment);
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: u32 = digits.parse().map_err(|_| invalid())?;
    if hour > 23 {
        return Err(invalid());
    }
    Ok(hour)
}

fn parse_step(segment: &str) -> Result<u32, FilenameError> {
    let invalid = || FilenameError::InvalidStep(segment.to_string());
    let digits = strip_suffix_ignore_case(segment, "h").unwrap_or(segment);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse().map_err(|_| invalid())
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    if s.is_char_boundary(split) && s[split..].eq_ignore_ascii_case(suffix) {
        Some(&s[..split])
    } else {
        None
    }
}

/// Parsed files grouped by initialization time, then forecast step.
///
/// Used for reporting only; step order in the output follows the file list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializationGroup {
    groups: BTreeMap<DateTime<Utc>, BTreeMap<u32, DateTime<Utc>>>,
}

impl InitializationGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a SourceFile>) -> Self {
        let mut group = Self::new();
        for file in files {
            group.record(file);
        }
        group
    }

    pub fn record(&mut self, file: &SourceFile) {
        self.groups
            .entry(file.init_time)
            .or_default()
            .insert(file.forecast_hours, file.valid_time);
    }

    /// Number of distinct initialization times.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Steps of one initialization time, ordered by forecast hour.
    pub fn steps(&self, init_time: &DateTime<Utc>) -> Option<&BTreeMap<u32, DateTime<Utc>>> {
        self.groups.get(init_time)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&DateTime<Utc>, &BTreeMap<u32, DateTime<Utc>>)> {
        self.groups.iter()
    }

    /// Report lines, sorted by initialization time then step.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (init, steps) in &self.groups {
            lines.push(format!("Init {}", init.format("%Y-%m-%d %H:%MZ")));
            for (hours, valid) in steps {
                lines.push(format!(
                    "  Step {}h → valid {}",
                    hours,
                    valid.format("%Y-%m-%d %H:%MZ")
                ));
            }
        }
        lines
    }

    /// Log the report at info level.
    pub fn log_report(&self) {
        for (init, steps) in &self.groups {
            info!(
                init_time = %init,
                steps = steps.len(),
                "Initialization group"
            );
            for (hours, valid) in steps {
                info!(init_time = %init, "Step {}h → valid {}", hours, valid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_detect_file_type() {
        assert_eq!(detect_file_type(Path::new("a.grib2")), FileType::Grib2);
        assert_eq!(detect_file_type(Path::new("a.GRIB2.gz")), FileType::Grib2Gz);
        assert_eq!(detect_file_type(Path::new("a.grb2")), FileType::Grib2);
        assert_eq!(detect_file_type(Path::new("a.nc")), FileType::Unknown);
        assert_eq!(detect_file_type(Path::new("Data.grib2/readme")), FileType::Unknown);
    }

    #[test]
    fn test_parse_example_name() {
        let file =
            parse_source_file(Path::new("./Data/model.res.20240115.00z.003h.grib2")).unwrap();
        assert_eq!(file.init_time, utc(2024, 1, 15, 0));
        assert_eq!(file.forecast_hours, 3);
        assert_eq!(file.valid_time, utc(2024, 1, 15, 3));
        assert_eq!(file.name(), "model.res.20240115.00z.003h.grib2");
    }

    #[test]
    fn test_parse_step_crosses_midnight() {
        let file = parse_source_file(Path::new("gfs.0p25.global.20240131.18z.012h.grib2")).unwrap();
        assert_eq!(file.init_time, utc(2024, 1, 31, 18));
        assert_eq!(file.valid_time, utc(2024, 2, 1, 6));
    }

    #[test]
    fn test_parse_gzip_name() {
        let file = parse_source_file(Path::new("model.res.20240115.06z.024h.grib2.gz")).unwrap();
        assert!(file.is_gzip());
        assert_eq!(file.init_time, utc(2024, 1, 15, 6));
        assert_eq!(file.forecast_hours, 24);
    }

    #[test]
    fn test_too_few_segments() {
        let err = parse_source_file(Path::new("model.20240115.00z.grib2")).unwrap_err();
        assert_eq!(
            err,
            FilenameError::TooFewSegments {
                found: 4,
                required: MIN_SEGMENTS
            }
        );
    }

    #[test]
    fn test_dots_in_directories_are_ignored() {
        let err = parse_source_file(Path::new("/a.b.c.d/e.f/model.grib2")).unwrap_err();
        assert!(matches!(err, FilenameError::TooFewSegments { found: 2, .. }));
    }

    #[test]
    fn test_invalid_segments() {
        assert!(matches!(
            parse_source_file(Path::new("m.r.2024011.00z.003h.grib2")),
            Err(FilenameError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_source_file(Path::new("m.r.20240230.00z.003h.grib2")),
            Err(FilenameError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_source_file(Path::new("m.r.20240115.24z.003h.grib2")),
            Err(FilenameError::InvalidHour(_))
        ));
        assert!(matches!(
            parse_source_file(Path::new("m.r.20240115.00z.-3h.grib2")),
            Err(FilenameError::InvalidStep(_))
        ));
    }

    #[test]
    fn test_initialization_group_report() {
        let files: Vec<SourceFile> = [
            "m.r.20240115.06z.006h.grib2",
            "m.r.20240115.00z.006h.grib2",
            "m.r.20240115.00z.003h.grib2",
        ]
        .iter()
        .map(|n| parse_source_file(Path::new(n)).unwrap())
        .collect();

        let group = InitializationGroup::from_files(&files);
        assert_eq!(group.len(), 2);
        assert_eq!(group.steps(&utc(2024, 1, 15, 0)).unwrap().len(), 2);

        let lines = group.lines();
        assert_eq!(lines[0], "Init 2024-01-15 00:00Z");
        assert_eq!(lines[1], "  Step 3h → valid 2024-01-15 03:00Z");
        assert_eq!(lines[2], "  Step 6h → valid 2024-01-15 06:00Z");
        assert_eq!(lines[3], "Init 2024-01-15 06:00Z");
    }
}
