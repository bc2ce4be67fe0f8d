//! Grid geometry for regular latitude/longitude fields (template 3.0).

use crate::sections::GridDefinition;
use crate::Grib2Error;

const MICRO: f64 = 1_000_000.0;
const MISSING_INCREMENT: u32 = u32::MAX;

/// Points scan in the -i direction (east to west)
pub const SCAN_NEGATIVE_I: u8 = 0x80;
/// Points scan in the +j direction (south to north)
pub const SCAN_POSITIVE_J: u8 = 0x40;
/// Adjacent points in j are consecutive
pub const SCAN_J_CONSECUTIVE: u8 = 0x20;
/// Alternate rows scan in opposite directions
pub const SCAN_BOUSTROPHEDON: u8 = 0x10;

/// 1-D coordinate axes of a regular grid, in degrees.
///
/// `latitudes[r]` and `longitudes[c]` give the position of element
/// `r * longitudes.len() + c` of the grid returned by [`to_row_major`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridCoordinates {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
}

impl GridCoordinates {
    pub fn from_definition(gd: &GridDefinition) -> Result<Self, Grib2Error> {
        if gd.template_number != 0 {
            return Err(Grib2Error::Unsupported(format!(
                "coordinates for grid template 3.{}",
                gd.template_number
            )));
        }

        let nj = gd.num_points_latitude as usize;
        let ni = gd.num_points_longitude as usize;

        let lat_step = axis_step(
            gd.latitude_increment_microdegrees,
            gd.first_latitude_microdegrees,
            gd.last_latitude_microdegrees,
            nj,
            gd.scanning_mode & SCAN_POSITIVE_J != 0,
        );
        let lon_step = axis_step(
            gd.longitude_increment_microdegrees,
            gd.first_longitude_microdegrees,
            gd.last_longitude_microdegrees,
            ni,
            gd.scanning_mode & SCAN_NEGATIVE_I == 0,
        );

        let lat0 = gd.first_latitude_microdegrees as f64 / MICRO;
        let lon0 = gd.first_longitude_microdegrees as f64 / MICRO;

        Ok(Self {
            latitudes: (0..nj).map(|r| lat0 + r as f64 * lat_step).collect(),
            longitudes: (0..ni).map(|c| lon0 + c as f64 * lon_step).collect(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.latitudes.len(), self.longitudes.len())
    }
}

/// Signed step between adjacent points along one axis, in degrees.
fn axis_step(increment: u32, first: i32, last: i32, count: usize, ascending: bool) -> f64 {
    let magnitude = if increment != MISSING_INCREMENT && increment != 0 {
        increment as f64 / MICRO
    } else if count > 1 {
        ((last as f64 - first as f64) / MICRO / (count - 1) as f64).abs()
    } else {
        0.0
    };

    if ascending {
        magnitude
    } else {
        -magnitude
    }
}

/// Arrange decoded values as a row-major `[lat][lon]` grid.
///
/// Rows follow the j scan direction and columns the i scan direction, so
/// the result lines up with [`GridCoordinates::from_definition`].
pub fn to_row_major(values: Vec<f32>, gd: &GridDefinition) -> Result<Vec<f32>, Grib2Error> {
    let nj = gd.num_points_latitude as usize;
    let ni = gd.num_points_longitude as usize;

    if values.len() != nj * ni {
        return Err(Grib2Error::UnpackingError(format!(
            "decoded {} values for a {}x{} grid",
            values.len(),
            nj,
            ni
        )));
    }

    if gd.scanning_mode & SCAN_BOUSTROPHEDON != 0 {
        return Err(Grib2Error::Unsupported(
            "boustrophedonic scanning".to_string(),
        ));
    }

    if gd.scanning_mode & SCAN_J_CONSECUTIVE == 0 {
        return Ok(values);
    }

    // Stored as columns of nj points; transpose to rows of ni points
    let mut grid = vec![f32::NAN; nj * ni];
    for (idx, value) in values.into_iter().enumerate() {
        let col = idx / nj;
        let row = idx % nj;
        grid[row * ni + col] = value;
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(scanning_mode: u8) -> GridDefinition {
        GridDefinition {
            template_number: 0,
            grid_shape: 6,
            num_points_latitude: 3,
            num_points_longitude: 4,
            first_latitude_microdegrees: 10_000_000,
            first_longitude_microdegrees: 0,
            last_latitude_microdegrees: 8_000_000,
            last_longitude_microdegrees: 3_000_000,
            latitude_increment_microdegrees: 1_000_000,
            longitude_increment_microdegrees: 1_000_000,
            scanning_mode,
        }
    }

    #[test]
    fn test_north_to_south_coordinates() {
        let coords = GridCoordinates::from_definition(&definition(0)).unwrap();
        assert_eq!(coords.latitudes, vec![10.0, 9.0, 8.0]);
        assert_eq!(coords.longitudes, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(coords.shape(), (3, 4));
    }

    #[test]
    fn test_south_to_north_coordinates() {
        let mut gd = definition(SCAN_POSITIVE_J);
        gd.first_latitude_microdegrees = 8_000_000;
        gd.last_latitude_microdegrees = 10_000_000;
        let coords = GridCoordinates::from_definition(&gd).unwrap();
        assert_eq!(coords.latitudes, vec![8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_missing_increment_is_derived() {
        let mut gd = definition(0);
        gd.longitude_increment_microdegrees = MISSING_INCREMENT;
        let coords = GridCoordinates::from_definition(&gd).unwrap();
        assert_eq!(coords.longitudes, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_transpose_j_consecutive() {
        let gd = definition(SCAN_J_CONSECUTIVE);
        // Column-major: column c holds 10c, 10c+1, 10c+2
        let values: Vec<f32> = (0..4)
            .flat_map(|c| (0..3).map(move |r| (c * 10 + r) as f32))
            .collect();
        let grid = to_row_major(values, &gd).unwrap();
        assert_eq!(&grid[0..4], &[0.0, 10.0, 20.0, 30.0]);
        assert_eq!(&grid[8..12], &[2.0, 12.0, 22.0, 32.0]);
    }

    #[test]
    fn test_size_mismatch() {
        let err = to_row_major(vec![0.0; 5], &definition(0)).unwrap_err();
        assert!(matches!(err, Grib2Error::UnpackingError(_)));
    }

    #[test]
    fn test_boustrophedon_rejected() {
        let err = to_row_major(vec![0.0; 12], &definition(SCAN_BOUSTROPHEDON)).unwrap_err();
        assert!(matches!(err, Grib2Error::Unsupported(_)));
    }
}
