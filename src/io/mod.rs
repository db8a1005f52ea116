//! Scene metadata and raster I/O

pub mod mtl;
#[cfg(feature = "gdal")]
pub mod raster;

use crate::core::calibrate::CalibrationConstants;
use crate::types::LstResult;

pub use mtl::MtlMetadata;
#[cfg(feature = "gdal")]
pub use raster::{ensure_same_grid, read_band, write_band, RasterBand};

/// Supplies per-band calibration constants for one scene
pub trait MetadataSource {
    fn scene_id(&self) -> &str;

    /// Constants for a TIRS band (10 or 11); a missing key is a configuration error
    fn calibration_constants(&self, band: u8) -> LstResult<CalibrationConstants>;
}
