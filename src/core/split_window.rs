//! Practical split-window LST equation (Du et al. 2015).
//!
//! ```text
//! LST = b0
//!     + (b1 + b2 (1-ε)/ε + b3 Δε/ε²) (Ti+Tj)/2
//!     + (b4 + b5 (1-ε)/ε + b6 Δε/ε²) (Ti-Tj)/2
//!     + b7 (Ti-Tj)²
//! ```

use crate::core::coefficients::{
    split_window_coefficients_for, LandCoverClass, SplitWindowCoefficients, SPLIT_WINDOW_FULL_RANGE,
};
use crate::types::{ensure_shape, is_no_data, DataFault, LstError, LstRaster, LstResult, StageOutput};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// How the b0..b7 vector is picked for a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoefficientSelection {
    /// Subrange containing the pixel's CWV
    #[default]
    ByWaterVapor,
    /// The [0, 6.3] fit everywhere; CWV is not consulted
    FullRange,
}

/// LST for one pixel with a given coefficient vector
pub fn lst_pixel(
    coefficients: &SplitWindowCoefficients,
    ti: f64,
    tj: f64,
    emissivity: f64,
    delta_emissivity: f64,
) -> Result<f64, DataFault> {
    if [ti, tj, emissivity, delta_emissivity].iter().any(|&v| is_no_data(v)) {
        return Err(DataFault::NoDataInput);
    }
    if emissivity <= 0.0 || emissivity > 1.0 {
        return Err(DataFault::InvalidEmissivity);
    }

    let b = &coefficients.b;
    let roughness = (1.0 - emissivity) / emissivity;
    let contrast = delta_emissivity / (emissivity * emissivity);
    let sum_half = (ti + tj) / 2.0;
    let diff = ti - tj;

    Ok(b[0]
        + (b[1] + b[2] * roughness + b[3] * contrast) * sum_half
        + (b[4] + b[5] * roughness + b[6] * contrast) * diff / 2.0
        + b[7] * diff * diff)
}

/// Split-window LST estimator
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitWindowEstimator {
    selection: CoefficientSelection,
}

impl SplitWindowEstimator {
    pub fn new(selection: CoefficientSelection) -> Self {
        Self { selection }
    }

    pub fn selection(&self) -> CoefficientSelection {
        self.selection
    }

    fn coefficients_at(&self, cwv: f64) -> Result<&'static SplitWindowCoefficients, DataFault> {
        match self.selection {
            CoefficientSelection::FullRange => Ok(&SPLIT_WINDOW_FULL_RANGE),
            CoefficientSelection::ByWaterVapor => {
                if is_no_data(cwv) {
                    return Err(DataFault::NoDataInput);
                }
                split_window_coefficients_for(cwv).ok_or(DataFault::RangeSelectionMiss)
            }
        }
    }

    /// LST for one pixel, choosing coefficients from `cwv` as configured
    pub fn pixel(&self, ti: f64, tj: f64, emissivity: f64, delta_emissivity: f64, cwv: f64) -> Result<f64, DataFault> {
        let coefficients = self.coefficients_at(cwv)?;
        lst_pixel(coefficients, ti, tj, emissivity, delta_emissivity)
    }

    fn check_inputs<'a>(&self, ti: &'a LstRaster, tj: &LstRaster, cwv: Option<&'a LstRaster>) -> LstResult<&'a LstRaster> {
        ensure_shape("channel j brightness temperature", tj, ti.dim())?;
        match (self.selection, cwv) {
            (_, Some(cwv)) => {
                ensure_shape("column water vapor", cwv, ti.dim())?;
                Ok(cwv)
            }
            // Stand-in producer, never read under FullRange
            (CoefficientSelection::FullRange, None) => Ok(ti),
            (CoefficientSelection::ByWaterVapor, None) => Err(LstError::MissingInput(
                "column water vapor is required for coefficient selection by water vapor".to_string(),
            )),
        }
    }

    /// LST (K) from per-pixel emissivity rasters
    pub fn estimate_lst(
        &self,
        ti: &LstRaster,
        tj: &LstRaster,
        emissivity: &LstRaster,
        delta_emissivity: &LstRaster,
        cwv: Option<&LstRaster>,
    ) -> LstResult<StageOutput> {
        let cwv = self.check_inputs(ti, tj, cwv)?;
        ensure_shape("average emissivity", emissivity, ti.dim())?;
        ensure_shape("delta emissivity", delta_emissivity, ti.dim())?;

        let (rows, cols) = ti.dim();
        log::info!("Estimating land surface temperature for {}x{} pixels", rows, cols);
        log::debug!("Coefficient selection: {:?}", self.selection);

        let zip = Zip::from(ti).and(tj).and(emissivity).and(delta_emissivity).and(cwv);
        let pixel = |&t_i: &f64, &t_j: &f64, &e: &f64, &de: &f64, &w: &f64| self.pixel(t_i, t_j, e, de, w);

        #[cfg(feature = "parallel")]
        let outcomes = zip.par_map_collect(pixel);
        #[cfg(not(feature = "parallel"))]
        let outcomes = zip.map_collect(pixel);

        let output = StageOutput::from_outcomes(outcomes);
        output.summary.log("land surface temperature");
        Ok(output)
    }

    /// LST (K) with scene-wide emissivity scalars
    pub fn estimate_lst_uniform(
        &self,
        ti: &LstRaster,
        tj: &LstRaster,
        emissivity: f64,
        delta_emissivity: f64,
        cwv: Option<&LstRaster>,
    ) -> LstResult<StageOutput> {
        let cwv = self.check_inputs(ti, tj, cwv)?;

        let (rows, cols) = ti.dim();
        log::info!(
            "Estimating land surface temperature for {}x{} pixels, emissivity {:.4}, delta {:.4}",
            rows,
            cols,
            emissivity,
            delta_emissivity
        );

        let zip = Zip::from(ti).and(tj).and(cwv);
        let pixel = |&t_i: &f64, &t_j: &f64, &w: &f64| self.pixel(t_i, t_j, emissivity, delta_emissivity, w);

        #[cfg(feature = "parallel")]
        let outcomes = zip.par_map_collect(pixel);
        #[cfg(not(feature = "parallel"))]
        let outcomes = zip.map_collect(pixel);

        let output = StageOutput::from_outcomes(outcomes);
        output.summary.log("land surface temperature");
        Ok(output)
    }

    /// LST (K) for a fixed land cover class
    pub fn estimate_lst_for_class(
        &self,
        ti: &LstRaster,
        tj: &LstRaster,
        cwv: Option<&LstRaster>,
        class: LandCoverClass,
    ) -> LstResult<StageOutput> {
        let lse = class.emissivity()?;
        self.estimate_lst_uniform(ti, tj, lse.average(), lse.delta(), cwv)
    }
}
