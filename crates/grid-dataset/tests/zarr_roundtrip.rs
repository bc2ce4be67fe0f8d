//! Integration tests: write datasets as Zarr stores and read them back.

use chrono::{Duration, TimeZone, Utc};
use grid_dataset::{
    read_dataset, Attributes, Dataset, DatasetError, Dim, StepCoord, StoreConfig, Variable,
    ZarrCompression, ZarrDatasetWriter,
};
use proptest::prelude::*;
use test_utils::{assert_approx_eq, create_temperature_grid, create_test_grid, temp_test_dir};

fn step(hours: u32) -> StepCoord {
    let init = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    StepCoord {
        forecast_hours: hours,
        init_time: init,
        valid_time: init + Duration::hours(hours as i64),
        source: format!("gfs.0p25.20240115.00z.{:03}h.grib2", hours),
    }
}

fn sample_dataset(width: usize, height: usize) -> Dataset {
    let latitude: Vec<f64> = (0..height).map(|r| 45.0 - r as f64 * 0.25).collect();
    let longitude: Vec<f64> = (0..width).map(|c| -130.0 + c as f64 * 0.25).collect();
    let mut ds = Dataset::new(latitude, longitude);

    let mut attrs = Attributes::new();
    attrs.insert("units".to_string(), serde_json::json!("K"));
    ds.insert("tmp_2m", Variable::grid(create_temperature_grid(width, height), attrs))
        .unwrap();
    ds.insert("grid", Variable::grid(create_test_grid(width, height), Attributes::new()))
        .unwrap();
    ds.attributes
        .insert("crs".to_string(), serde_json::json!("EPSG:4326"));
    ds
}

#[test]
fn test_roundtrip_grid_dataset() {
    let dir = temp_test_dir();
    let path = dir.path().join("grid.zarr");
    let original = sample_dataset(40, 30);

    let writer = ZarrDatasetWriter::new(StoreConfig {
        zarr_chunk_size: 16,
        ..Default::default()
    });
    let summary = writer.write(&original, &path).unwrap();
    assert_eq!(summary.variables, 2);
    assert_eq!(summary.steps, 0);

    let restored = read_dataset(&path).unwrap();
    assert_eq!(restored, original);
    assert_eq!(restored.variable("tmp_2m").unwrap().attributes["units"], "K");
    assert_eq!(restored.attributes["crs"], "EPSG:4326");
}

#[test]
fn test_roundtrip_with_steps_and_nan() {
    let dir = temp_test_dir();
    let path = dir.path().join("steps.zarr");

    let mut a = sample_dataset(8, 4);
    let mut b = sample_dataset(8, 4);
    b.remove("grid");
    a.variable_mut("tmp_2m").unwrap().data[3] = f32::NAN;
    let combined = Dataset::concat_steps(vec![
        a.expand_step(step(6)).unwrap(),
        b.expand_step(step(12)).unwrap(),
    ])
    .unwrap();

    ZarrDatasetWriter::new(StoreConfig::default())
        .write(&combined, &path)
        .unwrap();
    let restored = read_dataset(&path).unwrap();

    assert_eq!(restored.steps, combined.steps);
    let grid = restored.variable("grid").unwrap();
    assert_eq!(grid.dims, vec![Dim::Step, Dim::Latitude, Dim::Longitude]);
    assert!(grid.data[32..].iter().all(|v| v.is_nan()));

    let tmp = restored.variable("tmp_2m").unwrap();
    assert!(tmp.data[3].is_nan());
    assert_approx_eq!(tmp.data[4], combined.variable("tmp_2m").unwrap().data[4], 1e-6);
}

#[test]
fn test_roundtrip_each_compression() {
    for compression in [
        ZarrCompression::None,
        ZarrCompression::BloscLz4,
        ZarrCompression::BloscZstd,
    ] {
        let dir = temp_test_dir();
        let path = dir.path().join(format!("{}.zarr", compression));
        let original = sample_dataset(10, 10);

        ZarrDatasetWriter::new(StoreConfig {
            zarr_compression: compression,
            zarr_shuffle: compression != ZarrCompression::None,
            ..Default::default()
        })
        .write(&original, &path)
        .unwrap();

        assert_eq!(read_dataset(&path).unwrap(), original, "{}", compression);
    }
}

#[test]
fn test_coordinate_arrays_are_written() {
    let dir = temp_test_dir();
    let path = dir.path().join("coords.zarr");
    let ds = sample_dataset(4, 3).expand_step(step(6)).unwrap();

    ZarrDatasetWriter::new(StoreConfig::default())
        .write(&ds, &path)
        .unwrap();

    for name in ["latitude", "longitude", "step", "valid_time", "init_time", "tmp_2m"] {
        assert!(
            path.join(name).join("zarr.json").exists(),
            "missing array {}",
            name
        );
    }
}

#[test]
fn test_read_missing_store() {
    let dir = temp_test_dir();
    let err = read_dataset(&dir.path().join("nope.zarr")).unwrap_err();
    assert!(matches!(err, DatasetError::StorageError { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_roundtrip_preserves_values(
        width in 1usize..12,
        height in 1usize..12,
        seed in any::<u32>(),
    ) {
        let dir = temp_test_dir();
        let path = dir.path().join("prop.zarr");

        let latitude: Vec<f64> = (0..height).map(|r| r as f64).collect();
        let longitude: Vec<f64> = (0..width).map(|c| c as f64).collect();
        let data: Vec<f32> = (0..width * height)
            .map(|i| ((i as u32).wrapping_mul(2654435761) ^ seed) as f32 / 1.0e6)
            .collect();

        let mut ds = Dataset::new(latitude, longitude);
        ds.insert("v", Variable::grid(data, Attributes::new())).unwrap();

        ZarrDatasetWriter::new(StoreConfig { zarr_chunk_size: 5, ..Default::default() })
            .write(&ds, &path)
            .unwrap();
        prop_assert_eq!(read_dataset(&path).unwrap(), ds);
    }
}
