//! Split-window LST retrieval stages

pub mod calibrate;
pub mod coefficients;
pub mod emissivity;
pub mod masking;
pub mod pipeline;
pub mod split_window;
pub mod water_vapor;

// Re-export main types
pub use calibrate::{CalibrationConstants, ChannelInput, ThermalCalibrator, LANDSAT8_BAND10, LANDSAT8_BAND11};
pub use coefficients::{CwvModel, CwvModelEntry, LandCoverClass, SplitWindowCoefficients, Subrange};
pub use emissivity::{EmissivityInputs, EmissivityResolver, EmissivitySource, ResolvedEmissivity};
pub use masking::{apply_mask, CloudMapMask, CloudMask, MaskProvider, QaPixelMask};
pub use pipeline::{LstProduct, PipelineConfig, PipelineConfigBuilder, SplitWindowPipeline};
pub use split_window::{CoefficientSelection, SplitWindowEstimator};
pub use water_vapor::{ColumnWaterVaporEstimator, WindowSize};
