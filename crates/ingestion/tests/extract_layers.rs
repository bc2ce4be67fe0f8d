//! Per-file extraction against synthetic GRIB2 files.

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use ingestion::{parse_source_file, ExtractError, Extractor, DEFAULT_SOIL_DEPTHS_CM};
use test_utils::{files, grib2_file, write_grib2_file, Grib2Builder, SOIL_DEPTHS_CM};

fn extractor() -> Extractor {
    Extractor::new(DEFAULT_SOIL_DEPTHS_CM.to_vec())
}

fn surface_fields() -> Vec<Grib2Builder> {
    vec![
        Grib2Builder::new(),
        Grib2Builder::new()
            .with_parameter(3, 1)
            .with_level(101, 0, 0)
            .with_gradient(100_000.0, 102_000.0),
    ]
}

fn soil_fields(depths: &[u32]) -> Vec<Grib2Builder> {
    depths
        .iter()
        .flat_map(|&d| [Grib2Builder::soil_moisture(d), Grib2Builder::soil_temperature(d)])
        .collect()
}

fn write(dir: &Path, name: &str, messages: &[Grib2Builder]) -> ingestion::SourceFile {
    let path = write_grib2_file(dir, name, messages);
    parse_source_file(&path).unwrap()
}

#[test]
fn test_main_and_all_depths() {
    let dir = tempfile::tempdir().unwrap();
    let mut messages = surface_fields();
    messages.extend(soil_fields(&SOIL_DEPTHS_CM));
    let source = write(dir.path(), files::VALID_STEP_6, &messages);

    let result = extractor().extract_file(&source).unwrap();

    assert_eq!(
        result.dataset.variable_names(),
        vec!["prmsl", "stl1", "stl2", "stl3", "swvl1", "swvl2", "swvl3", "tmp_2m"]
    );
    assert_eq!(result.present_depths, vec![0, 7, 28]);
    assert!(result.absent_depths.is_empty());
    assert!(result.dropped_variables.is_empty());

    let swvl2 = result.dataset.variable("swvl2").unwrap();
    assert!(swvl2.data.iter().all(|v| (v - 0.25).abs() < 1e-3));
    assert_eq!(swvl2.attributes["grib_short_name"], "SOILW");
    assert_eq!(result.dataset.attributes["centre"], 7);
}

#[test]
fn test_missing_depths_are_absent_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut messages = surface_fields();
    messages.extend(soil_fields(&[0]));
    let source = write(dir.path(), files::VALID_STEP_6, &messages);

    let result = extractor().extract_file(&source).unwrap();

    assert_eq!(result.present_depths, vec![0]);
    let absent: Vec<u32> = result.absent_depths.iter().map(|a| a.depth_cm).collect();
    assert_eq!(absent, vec![7, 28]);
    assert!(result.absent_depths[0].reason.contains("depth 7 cm"));

    assert!(result.dataset.contains("tmp_2m"));
    assert!(result.dataset.contains("swvl1"));
    assert!(result.dataset.contains("stl1"));
    assert!(!result.dataset.contains("swvl2"));
}

#[test]
fn test_depth_on_other_grid_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let mut messages = surface_fields();
    messages.push(Grib2Builder::soil_moisture(0));
    messages.push(
        Grib2Builder::soil_moisture(7)
            .with_grid(4, 2)
            .with_extent(10.0, 0.0, 0.0, 270.0, 90.0, 10.0),
    );
    let source = write(dir.path(), files::VALID_STEP_6, &messages);

    let result = extractor().extract_file(&source).unwrap();

    assert_eq!(result.present_depths, vec![0]);
    let depth7 = &result.absent_depths[0];
    assert_eq!(depth7.depth_cm, 7);
    assert!(depth7.reason.contains("main layer"), "{}", depth7.reason);
}

#[test]
fn test_duplicate_field_keeps_first() {
    let dir = tempfile::tempdir().unwrap();
    let messages = vec![
        Grib2Builder::new().with_constant_value(270.0),
        Grib2Builder::new().with_constant_value(300.0),
    ];
    let source = write(dir.path(), files::VALID_STEP_6, &messages);

    let result = extractor().extract_file(&source).unwrap();
    let tmp = result.dataset.variable("tmp_2m").unwrap();
    assert!(tmp.data.iter().all(|v| (v - 270.0).abs() < 1e-3));
}

#[test]
fn test_unlisted_depths_stay_under_generic_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut messages = surface_fields();
    messages.extend(soil_fields(&[0, 100]));
    let source = write(dir.path(), files::VALID_STEP_6, &messages);

    let result = extractor().extract_file(&source).unwrap();

    assert_eq!(
        result.dataset.variable_names(),
        vec!["prmsl", "soilw_100cm", "stl1", "swvl1", "tmp_2m", "tsoil_100cm"]
    );
    assert_eq!(result.present_depths, vec![0]);
    assert!(result.dropped_variables.is_empty());

    let deep = result.dataset.variable("soilw_100cm").unwrap();
    assert_eq!(deep.attributes["grib_short_name"], "SOILW");
}

#[test]
fn test_depth_names_replace_generic_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut messages = surface_fields();
    messages.extend(soil_fields(&[0, 7]));
    let source = write(dir.path(), files::VALID_STEP_6, &messages);

    let result = extractor().extract_file(&source).unwrap();

    let names = result.dataset.variable_names();
    assert!(names.iter().all(|n| !n.ends_with("cm")), "{:?}", names);
    assert!(result.dataset.contains("swvl2"));
    assert!(result.dataset.contains("stl2"));
}

#[test]
fn test_other_depth_fields_carry_depth_in_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut messages = surface_fields();
    messages.push(
        Grib2Builder::new()
            .with_discipline(2)
            .with_parameter(0, 0)
            .with_depth_cm(7)
            .with_constant_value(1.0),
    );
    let source = write(dir.path(), files::VALID_STEP_6, &messages);

    let result = extractor().extract_file(&source).unwrap();
    assert!(result.dataset.contains("land_7cm"));
}

#[test]
fn test_gzip_source() {
    let dir = tempfile::tempdir().unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&grib2_file(&surface_fields())).unwrap();
    let path = dir.path().join(format!("{}.gz", files::VALID_STEP_6));
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();

    let source = parse_source_file(&path).unwrap();
    let result = extractor().extract_file(&source).unwrap();
    assert_eq!(result.dataset.variable_names(), vec!["prmsl", "tmp_2m"]);
}

#[test]
fn test_unreadable_file_fails_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(files::VALID_STEP_6);
    std::fs::write(&path, b"this is not a forecast").unwrap();

    let source = parse_source_file(&path).unwrap();
    assert!(matches!(
        extractor().extract_file(&source),
        Err(ExtractError::NoMessages)
    ));
}

#[test]
fn test_soil_only_file_is_extracted() {
    let dir = tempfile::tempdir().unwrap();
    let source = write(dir.path(), files::VALID_STEP_6, &soil_fields(&[0]));

    let result = extractor().extract_file(&source).unwrap();

    assert_eq!(result.dataset.variable_names(), vec!["stl1", "swvl1"]);
    assert_eq!(result.present_depths, vec![0]);
    assert_eq!(result.absent_depths.len(), 2);
}

#[test]
fn test_main_extract_names_depth_fields_by_depth() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_grib2_file(dir.path(), files::VALID_STEP_6, &soil_fields(&[0, 28]));
    let extractor = extractor();
    let messages = extractor.read_messages(&path, false).unwrap();

    let main = extractor.extract_main(&messages).unwrap();

    assert_eq!(
        main.dataset.variable_names(),
        vec!["soilw_0cm", "soilw_28cm", "tsoil_0cm", "tsoil_28cm"]
    );
}

#[test]
fn test_truncated_tail_keeps_leading_messages() {
    let dir = tempfile::tempdir().unwrap();
    let mut bytes = grib2_file(&surface_fields());
    let second = Grib2Builder::soil_moisture(0).build();
    bytes.extend_from_slice(&second[..second.len() / 2]);
    let path = dir.path().join(files::VALID_STEP_6);
    std::fs::write(&path, bytes).unwrap();

    let source = parse_source_file(&path).unwrap();
    let result = extractor().extract_file(&source).unwrap();
    assert_eq!(result.dataset.len(), 2);
    assert_eq!(result.absent_depths.len(), 3);
}
