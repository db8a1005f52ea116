use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Real-valued sample type used by every stage
pub type LstReal = f64;

/// 2D raster (rows x cols); non-finite samples are no-data
pub type LstRaster = Array2<LstReal>;

/// No-data sentinel written by every stage
pub const NO_DATA: LstReal = f64::NAN;

/// Absolute zero offset for Kelvin to Celsius conversion
pub const KELVIN_OFFSET: LstReal = 273.15;

/// Test whether a sample is no-data
#[inline]
pub fn is_no_data(value: LstReal) -> bool {
    !value.is_finite()
}

/// Convert an LST raster from Kelvin to Celsius, keeping no-data
pub fn kelvin_to_celsius(kelvin: &LstRaster) -> LstRaster {
    kelvin.mapv(|k| if is_no_data(k) { NO_DATA } else { k - KELVIN_OFFSET })
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// GDAL coefficient order
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

/// Error types for LST retrieval.
///
/// Every variant is raised before raster work starts. Problems with
/// individual pixels are never errors, see [`DataFault`].
#[derive(Debug, thiserror::Error)]
pub enum LstError {
    #[error("Invalid calibration constants: {0}")]
    InvalidCalibration(String),

    #[error("Unknown land cover class: '{0}'")]
    UnknownClass(String),

    #[error("Conflicting inputs: {0}")]
    ConflictingInputs(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Invalid window size {0}: expected one of 3, 5, 7")]
    InvalidWindowSize(usize),

    #[error("Raster shape mismatch: {name} is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl LstError {
    /// Configuration errors are the caller's to fix; I/O failures are not
    pub fn is_configuration_error(&self) -> bool {
        match self {
            LstError::Io(_) => false,
            #[cfg(feature = "gdal")]
            LstError::Gdal(_) => false,
            _ => true,
        }
    }
}

/// Result type for LST operations
pub type LstResult<T> = Result<T, LstError>;

/// Ensure `raster` has the `expected` shape
pub fn ensure_shape(name: &str, raster: &LstRaster, expected: (usize, usize)) -> LstResult<()> {
    if raster.dim() != expected {
        return Err(LstError::ShapeMismatch {
            name: name.to_string(),
            expected,
            actual: raster.dim(),
        });
    }
    Ok(())
}

/// Reason a single pixel resolved to no-data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataFault {
    /// An input term was already no-data
    NoDataInput,
    /// Spectral radiance was zero or negative
    NonPositiveRadiance,
    /// Land cover code absent from the lookup table
    UnmappedLandCover,
    /// Average emissivity outside (0, 1]
    InvalidEmissivity,
    /// Window extends past the raster edge
    IncompleteWindow,
    /// Flat window, ratio undefined
    DegenerateVariance,
    /// Value outside every coefficient subrange
    RangeSelectionMiss,
}

impl std::fmt::Display for DataFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DataFault::NoDataInput => "no-data input",
            DataFault::NonPositiveRadiance => "non-positive radiance",
            DataFault::UnmappedLandCover => "unmapped land cover",
            DataFault::InvalidEmissivity => "invalid emissivity",
            DataFault::IncompleteWindow => "incomplete window",
            DataFault::DegenerateVariance => "degenerate variance",
            DataFault::RangeSelectionMiss => "range selection miss",
        };
        write!(f, "{}", label)
    }
}

/// Per-stage tally of no-data pixels by cause
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultSummary {
    pub total_pixels: usize,
    pub faults: BTreeMap<DataFault, usize>,
}

impl FaultSummary {
    /// Split per-pixel outcomes into a raster and a tally
    pub fn split(outcomes: Array2<Result<LstReal, DataFault>>) -> (LstRaster, FaultSummary) {
        let mut summary = FaultSummary {
            total_pixels: outcomes.len(),
            faults: BTreeMap::new(),
        };
        let raster = outcomes.mapv(|outcome| match outcome {
            Ok(value) => value,
            Err(fault) => {
                *summary.faults.entry(fault).or_insert(0) += 1;
                NO_DATA
            }
        });
        (raster, summary)
    }

    pub fn count(&self, fault: DataFault) -> usize {
        self.faults.get(&fault).copied().unwrap_or(0)
    }

    pub fn no_data_pixels(&self) -> usize {
        self.faults.values().sum()
    }

    pub fn no_data_percentage(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        self.no_data_pixels() as f64 / self.total_pixels as f64 * 100.0
    }

    /// Log the tally under a stage name
    pub fn log(&self, stage: &str) {
        log::info!(
            "{}: {} of {} pixels no-data ({:.2}%)",
            stage,
            self.no_data_pixels(),
            self.total_pixels,
            self.no_data_percentage()
        );
        for (fault, count) in &self.faults {
            log::debug!("{}:   {} -> {}", stage, fault, count);
        }
    }
}

/// Raster produced by one stage, with its no-data tally
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub raster: LstRaster,
    pub summary: FaultSummary,
}

impl StageOutput {
    pub fn from_outcomes(outcomes: Array2<Result<LstReal, DataFault>>) -> Self {
        let (raster, summary) = FaultSummary::split(outcomes);
        Self { raster, summary }
    }
}
