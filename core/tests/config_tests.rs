use std::path::Path;
use sv_core::{Error, StitchConfig};

#[test]
fn load_reads_overrides_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stitch.json");
    std::fs::write(
        &path,
        r#"{
            "num_cameras": 6,
            "process_scale": 0.25,
            "output_width": 800,
            "output_height": 600
        }"#,
    )
    .unwrap();

    let config = StitchConfig::load(&path).unwrap();
    assert_eq!(config.num_cameras, 6);
    assert_eq!(config.output_size(), (800, 600));
    // Unspecified knobs keep their defaults.
    assert_eq!(config.input_width, 1920);
    assert_eq!(config.scaled_input_size(), (480, 270));
}

#[test]
fn load_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stitch.json");
    std::fs::write(&path, r#"{"process_scale": 4.0}"#).unwrap();

    let err = StitchConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn load_fails_on_missing_file() {
    let err = StitchConfig::load(Path::new("/nonexistent/stitch.json")).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}
