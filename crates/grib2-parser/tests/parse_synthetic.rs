//! Parse synthetic GRIB2 files built with `test_utils::Grib2Builder`.

use bytes::Bytes;
use chrono::{Datelike, Timelike};
use grib2_parser::grid::{SCAN_J_CONSECUTIVE, SCAN_POSITIVE_J};
use grib2_parser::{Grib2Error, Grib2Reader, Grib2Tables, DEPTH_BELOW_LAND_LAYER};
use proptest::prelude::*;
use test_utils::{assert_approx_eq, grib2_file, Grib2Builder};

fn read(bytes: Vec<u8>) -> Vec<grib2_parser::Grib2Message> {
    Grib2Reader::new(Bytes::from(bytes), Grib2Tables::standard())
        .read_all()
        .expect("synthetic file should parse")
}

#[test]
fn test_metadata_of_single_message() {
    let builder = Grib2Builder::new()
        .with_reference_time(2025, 6, 15, 12)
        .with_forecast_hour(6);
    let messages = read(builder.build());

    assert_eq!(messages.len(), 1);
    let msg = &messages[0];

    assert_eq!(msg.indicator.discipline, 0);
    assert_eq!(msg.identification.center, 7);
    assert_eq!(msg.identification.reference_time.year(), 2025);
    assert_eq!(msg.identification.reference_time.month(), 6);
    assert_eq!(msg.identification.reference_time.hour(), 12);

    assert_eq!(msg.product_definition.parameter_short_name, "TMP");
    assert_eq!(msg.product_definition.level_type, 103);
    assert_eq!(msg.product_definition.level(), 2.0);
    assert_eq!(msg.product_definition.level_description, "2 m above ground");
    assert_eq!(msg.product_definition.forecast_hour, 6);
    assert!(!msg.is_depth_layer());
}

#[test]
fn test_negative_latitude_is_sign_magnitude() {
    let msg = &read(Grib2Builder::new().build())[0];

    assert_eq!(msg.grid_definition.first_latitude_microdegrees, 10_000_000);
    assert_eq!(msg.grid_definition.last_latitude_microdegrees, -10_000_000);
    assert_eq!(msg.grid_definition.longitude_increment_microdegrees, 45_000_000);
    assert_eq!(msg.grid_definition.latitude_increment_microdegrees, 10_000_000);

    let coords = msg.coordinates().unwrap();
    assert_eq!(coords.latitudes, vec![10.0, 0.0, -10.0]);
    assert_eq!(coords.longitudes.len(), 8);
    assert_approx_eq!(coords.longitudes[7], 315.0, 1e-9);
}

#[test]
fn test_multiple_messages_in_one_file() {
    let file = grib2_file(&[
        Grib2Builder::new(),
        Grib2Builder::soil_moisture(0),
        Grib2Builder::soil_moisture(7),
        Grib2Builder::soil_temperature(28),
    ]);
    let messages = read(file);

    assert_eq!(messages.len(), 4);
    assert_eq!(
        messages.iter().map(|m| m.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );

    let soil = &messages[2];
    assert!(soil.is_depth_layer());
    assert_eq!(soil.product_definition.level_type, DEPTH_BELOW_LAND_LAYER);
    assert_eq!(soil.product_definition.parameter_short_name, "SOILW");
    assert_approx_eq!(soil.product_definition.level(), 0.07, 1e-12);

    assert_eq!(
        messages[3].product_definition.parameter_short_name,
        "TSOIL"
    );
}

#[test]
fn test_unpack_values_and_bitmap() {
    let mut data: Vec<f32> = (0..24).map(|i| 270.0 + i as f32).collect();
    data[5] = f32::NAN;
    data[17] = f32::NAN;

    let msg = &read(Grib2Builder::new().with_data(data.clone()).build())[0];
    assert!(msg.bitmap.is_some());

    let values = msg.unpack_grid().unwrap();
    assert_eq!(values.len(), 24);
    for (got, want) in values.iter().zip(&data) {
        if want.is_nan() {
            assert!(got.is_nan());
        } else {
            assert_approx_eq!(*got, *want, 0.01);
        }
    }
}

#[test]
fn test_sentinel_survives_packing_exactly() {
    let mut data = vec![0.3_f32; 24];
    data[0] = -9999.0;

    let msg = &read(Grib2Builder::new().with_data(data).build())[0];
    let values = msg.unpack_grid().unwrap();

    assert_eq!(values[0], -9999.0);
}

#[test]
fn test_j_consecutive_grid_is_transposed() {
    // 2 rows x 3 cols stored column by column
    let builder = Grib2Builder::new()
        .with_grid(3, 2)
        .with_extent(0.0, 0.0, 1.0, 2.0, 1.0, 1.0)
        .with_scanning_mode(SCAN_POSITIVE_J | SCAN_J_CONSECUTIVE)
        .with_data(vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0]);

    let msg = &read(builder.build())[0];
    let grid = msg.unpack_grid().unwrap();
    let rounded: Vec<f32> = grid.iter().map(|v| v.round()).collect();

    assert_eq!(rounded, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    assert_eq!(msg.coordinates().unwrap().latitudes, vec![0.0, 1.0]);
}

#[test]
fn test_truncated_file_is_an_error() {
    let mut bytes = Grib2Builder::new().build();
    bytes.truncate(bytes.len() - 10);

    let err = Grib2Reader::new(Bytes::from(bytes), Grib2Tables::standard())
        .read_all()
        .unwrap_err();
    assert!(matches!(err, Grib2Error::Truncated { .. }));
}

#[test]
fn test_garbage_between_messages_is_skipped() {
    let mut bytes = b"junk".to_vec();
    bytes.extend(Grib2Builder::new().build());
    bytes.extend_from_slice(b"\0\0\0");
    bytes.extend(Grib2Builder::soil_moisture(0).build());

    assert_eq!(read(bytes).len(), 2);
}

#[test]
fn test_iterator_stops_after_error() {
    let mut bytes = Grib2Builder::new().build();
    let second = Grib2Builder::new().build();
    bytes.extend_from_slice(&second[..second.len() - 1]);

    let results: Vec<_> = Grib2Reader::new(Bytes::from(bytes), Grib2Tables::standard()).collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}

proptest! {
    #[test]
    fn prop_unpacked_values_within_packing_precision(
        values in proptest::collection::vec(-50.0f32..50.0, 24)
    ) {
        let msg = &read(Grib2Builder::new().with_data(values.clone()).build())[0];
        let decoded = msg.unpack_grid().unwrap();

        let (min, max) = values
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let tolerance = ((max - min) / 65535.0).max(1e-4) * 2.0;
        for (got, want) in decoded.iter().zip(&values) {
            prop_assert!((got - want).abs() <= tolerance, "{} vs {}", got, want);
        }
    }
}
