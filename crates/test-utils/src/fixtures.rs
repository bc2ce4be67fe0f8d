//! Common fixtures for forecast ingestion tests.

/// Forecast file names following `<model>.<res>.<YYYYMMDD>.<HHz>.<FFFh>.grib2`.
pub mod files {
    /// Valid name: init 2024-01-15 00Z, step 006.
    pub const VALID_STEP_6: &str = "gfs.0p25.20240115.00z.006h.grib2";

    /// Same run, step 012.
    pub const VALID_STEP_12: &str = "gfs.0p25.20240115.00z.012h.grib2";

    /// Same run, step 000.
    pub const VALID_STEP_0: &str = "gfs.0p25.20240115.00z.000h.grib2";

    /// Fewer than six dot-separated segments.
    pub const TOO_FEW_SEGMENTS: &str = "gfs.20240115.00z.grib2";

    /// Non-numeric date segment.
    pub const BAD_DATE: &str = "gfs.0p25.2024XX15.00z.006h.grib2";

    /// Builds a name for the default run at the given step.
    pub fn for_step(step: u32) -> String {
        format!("gfs.0p25.20240115.00z.{:03}h.grib2", step)
    }

    /// Builds a name for an arbitrary run.
    pub fn for_run(date: &str, hour: u32, step: u32) -> String {
        format!("gfs.0p25.{}.{:02}z.{:03}h.grib2", date, hour, step)
    }
}

/// Soil depths, in centimetres, extracted alongside the main layer.
pub const SOIL_DEPTHS_CM: [u32; 3] = [0, 7, 28];

/// Sentinel written by the producer for missing values.
pub const SENTINEL: f32 = -9999.0;

/// CRS attribute attached to cleaned output.
pub const EPSG_4326: &str = "EPSG:4326";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_step_padding() {
        assert_eq!(files::for_step(6), files::VALID_STEP_6);
        assert_eq!(files::for_step(12), files::VALID_STEP_12);
        assert_eq!(files::for_step(0), files::VALID_STEP_0);
        assert_eq!(files::for_run("20240115", 0, 6), files::VALID_STEP_6);
    }
}
