//! swlst: Practical split-window Land Surface Temperature retrieval
//!
//! Estimates LST from Landsat 8 TIRS bands 10 and 11 following Du et al.
//! (2015), with column water vapor from the windowed covariance-variance
//! ratio of Ren et al. (2014) and emissivity from FROM-GLC land cover.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    DataFault, FaultSummary, GeoTransform, LstError, LstRaster, LstResult, StageOutput, NO_DATA,
};

pub use crate::core::{
    CalibrationConstants, CoefficientSelection, ColumnWaterVaporEstimator, EmissivityResolver,
    LandCoverClass, LstProduct, PipelineConfig, SplitWindowEstimator, SplitWindowPipeline,
    ThermalCalibrator, LANDSAT8_BAND10, LANDSAT8_BAND11,
};
pub use io::{MetadataSource, MtlMetadata};
