//! Cloud masking applied to the thermal bands before calibration.

use crate::types::{is_no_data, LstError, LstRaster, LstResult, NO_DATA};
use ndarray::{Array2, Zip};

/// Landsat 8 QA value for high-confidence cloud
pub const DEFAULT_QA_PIXEL: u16 = 61440;

/// Something that can say which cells to drop
pub trait MaskProvider {
    /// Boolean mask for a raster of `shape`; `true` = masked
    fn mask(&self, shape: (usize, usize)) -> LstResult<Array2<bool>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

fn check_mask_shape(name: &str, actual: (usize, usize), expected: (usize, usize)) -> LstResult<()> {
    if actual != expected {
        return Err(LstError::ShapeMismatch {
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Mask from the Quality Assessment band
#[derive(Debug, Clone)]
pub struct QaPixelMask {
    pub qa_band: LstRaster,
    /// QA values to mask out
    pub pixel_values: Vec<u16>,
}

impl QaPixelMask {
    pub fn new(qa_band: LstRaster) -> Self {
        Self {
            qa_band,
            pixel_values: vec![DEFAULT_QA_PIXEL],
        }
    }

    pub fn with_pixel_values(qa_band: LstRaster, pixel_values: Vec<u16>) -> LstResult<Self> {
        if pixel_values.is_empty() {
            return Err(LstError::MissingInput("QA mask needs at least one pixel value".to_string()));
        }
        Ok(Self { qa_band, pixel_values })
    }
}

impl MaskProvider for QaPixelMask {
    fn mask(&self, shape: (usize, usize)) -> LstResult<Array2<bool>> {
        check_mask_shape("QA band", self.qa_band.dim(), shape)?;
        let values = &self.pixel_values;
        Ok(self
            .qa_band
            .mapv(|qa| !is_no_data(qa) && values.iter().any(|&v| qa == f64::from(v))))
    }

    fn describe(&self) -> String {
        format!("QA band pixel values {:?}", self.pixel_values)
    }
}

/// Cloud map used as an inverted mask: any non-zero value masks the cell
#[derive(Debug, Clone)]
pub struct CloudMapMask {
    pub cloud_map: LstRaster,
}

impl CloudMapMask {
    pub fn new(cloud_map: LstRaster) -> Self {
        Self { cloud_map }
    }
}

impl MaskProvider for CloudMapMask {
    fn mask(&self, shape: (usize, usize)) -> LstResult<Array2<bool>> {
        check_mask_shape("cloud map", self.cloud_map.dim(), shape)?;
        Ok(self.cloud_map.mapv(|c| !is_no_data(c) && c != 0.0))
    }

    fn describe(&self) -> String {
        "cloud map".to_string()
    }
}

/// The masks a run can use; the two are mutually exclusive
#[derive(Debug, Clone)]
pub enum CloudMask {
    QaPixel(QaPixelMask),
    CloudMap(CloudMapMask),
}

impl MaskProvider for CloudMask {
    fn mask(&self, shape: (usize, usize)) -> LstResult<Array2<bool>> {
        match self {
            CloudMask::QaPixel(m) => m.mask(shape),
            CloudMask::CloudMap(m) => m.mask(shape),
        }
    }

    fn describe(&self) -> String {
        match self {
            CloudMask::QaPixel(m) => m.describe(),
            CloudMask::CloudMap(m) => m.describe(),
        }
    }
}

/// Copy of `raster` with masked cells set to no-data
pub fn apply_mask(raster: &LstRaster, mask: &Array2<bool>) -> LstResult<LstRaster> {
    check_mask_shape("mask", mask.dim(), raster.dim())?;
    Ok(Zip::from(raster)
        .and(mask)
        .map_collect(|&value, &masked| if masked { NO_DATA } else { value }))
}
