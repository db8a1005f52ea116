use ndarray::Array2;
use std::io::Write;
use swlst::core::calibrate::brightness_temperature_to_radiance;
use swlst::types::LstError;
use swlst::{MetadataSource, MtlMetadata, PipelineConfig, SplitWindowPipeline};

const MTL: &str = r#"GROUP = L1_METADATA_FILE
  GROUP = METADATA_FILE_INFO
    ORIGIN = "Image courtesy of the U.S. Geological Survey"
    LANDSAT_SCENE_ID = "LC81920272015170LGN00"
    FILE_DATE = 2015-06-19T14:11:25Z
  END_GROUP = METADATA_FILE_INFO
  GROUP = PRODUCT_METADATA
    SPACECRAFT_ID = "LANDSAT_8"
    DATE_ACQUIRED = 2015-06-19
    SCENE_CENTER_TIME = "09:53:22.8621720Z"
  END_GROUP = PRODUCT_METADATA
  GROUP = RADIOMETRIC_RESCALING
    RADIANCE_MULT_BAND_10 = 3.3420E-04
    RADIANCE_MULT_BAND_11 = 3.3420E-04
    RADIANCE_ADD_BAND_10 = 0.10000
    RADIANCE_ADD_BAND_11 = 0.10000
  END_GROUP = RADIOMETRIC_RESCALING
  GROUP = TIRS_THERMAL_CONSTANTS
    K1_CONSTANT_BAND_10 = 774.8853
    K1_CONSTANT_BAND_11 = 480.8883
    K2_CONSTANT_BAND_10 = 1321.0789
    K2_CONSTANT_BAND_11 = 1201.1442
  END_GROUP = TIRS_THERMAL_CONSTANTS
END_GROUP = L1_METADATA_FILE
END
"#;

fn write_mtl(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes()).expect("Failed to write MTL");
    file
}

#[test]
fn test_read_mtl_file() {
    let _ = env_logger::builder().is_test(true).try_init();

    let file = write_mtl(MTL);
    let mtl = MtlMetadata::from_file(file.path()).expect("Failed to parse MTL");

    assert_eq!(mtl.scene_id(), "LC81920272015170LGN00");
    assert_eq!(mtl.get("SPACECRAFT_ID"), Some("LANDSAT_8"));
    let time = mtl.acquisition_time().expect("missing scene centre time");
    assert_eq!(time.format("%Y-%m-%d %H:%M:%S").to_string(), "2015-06-19 09:53:22");

    let b10 = mtl.calibration_constants(10).unwrap();
    let b11 = mtl.calibration_constants(11).unwrap();
    assert_eq!(b10.k2, 1321.0789);
    assert_eq!(b11.k1, 480.8883);
}

#[test]
fn test_missing_file_is_not_a_configuration_error() {
    let err = MtlMetadata::from_file("/nonexistent/LC08_MTL.txt").unwrap_err();
    assert!(matches!(err, LstError::Io(_)));
    assert!(!err.is_configuration_error());
}

#[test]
fn test_missing_thermal_constant_is_reported() {
    let file = write_mtl(&MTL.replace("    K2_CONSTANT_BAND_11 = 1201.1442\n", ""));
    let mtl = MtlMetadata::from_file(file.path()).unwrap();

    let err = mtl.calibration_constants(11).unwrap_err();
    assert!(err.to_string().contains("K2_CONSTANT_BAND_11"));
    assert!(err.is_configuration_error());
}

#[test]
fn test_pipeline_from_metadata() {
    let _ = env_logger::builder().is_test(true).try_init();

    let file = write_mtl(MTL);
    let mtl = MtlMetadata::from_file(file.path()).unwrap();
    let b10 = mtl.calibration_constants(10).unwrap();
    let b11 = mtl.calibration_constants(11).unwrap();

    // Digital numbers that calibrate back to a gently varying scene
    let t10 = Array2::from_shape_fn((6, 6), |(i, j)| 297.0 + 0.3 * i as f64 + 0.15 * j as f64);
    let t11 = t10.mapv(|t| 1.1 * t - 30.5);
    let to_dn = |t: f64, c: &swlst::CalibrationConstants| {
        (brightness_temperature_to_radiance(t, c) - c.radiance_add) / c.radiance_mult
    };
    let dn10 = t10.mapv(|t| to_dn(t, &b10));
    let dn11 = t11.mapv(|t| to_dn(t, &b11));

    let config = PipelineConfig::builder()
        .digital_numbers_from_metadata(dn10, dn11, &mtl)
        .unwrap()
        .emissivity_class("Impervious")
        .build()
        .unwrap();
    let product = SplitWindowPipeline::new(config).run().unwrap();

    assert!((product.brightness_temperature_i.raster[[3, 3]] - t10[[3, 3]]).abs() < 1e-6);
    assert!(product.lst.raster[[3, 3]].is_finite());
    assert_eq!(product.cwv.summary.no_data_pixels(), 20);
}
