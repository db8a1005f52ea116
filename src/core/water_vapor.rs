//! Column water vapor from two brightness temperature bands.
//!
//! Modified split-window covariance-variance ratio: within an n x n window
//! centred on each pixel,
//!
//! ```text
//! Rji = Σ(Ti - mean(Ti)) (Tj - mean(Tj)) / Σ(Ti - mean(Ti))²
//! ```
//!
//! and CWV follows from the piecewise polynomial in [`CwvModel`].

use crate::core::coefficients::CwvModel;
use crate::types::{ensure_shape, is_no_data, DataFault, LstError, LstRaster, LstResult, StageOutput};
use ndarray::{s, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Denominators below this are treated as a flat window
pub const DEGENERATE_VARIANCE_EPSILON: f64 = 1e-10;

/// Odd CWV window side length, one of 3, 5, 7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct WindowSize(usize);

impl WindowSize {
    pub const ALLOWED: [usize; 3] = [3, 5, 7];

    pub fn new(size: usize) -> LstResult<Self> {
        if !Self::ALLOWED.contains(&size) {
            return Err(LstError::InvalidWindowSize(size));
        }
        Ok(Self(size))
    }

    pub fn get(&self) -> usize {
        self.0
    }

    pub fn half(&self) -> usize {
        self.0 / 2
    }
}

impl TryFrom<usize> for WindowSize {
    type Error = LstError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        WindowSize::new(size)
    }
}

impl From<WindowSize> for usize {
    fn from(window: WindowSize) -> usize {
        window.0
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self(3)
    }
}

/// Windowed column water vapor estimator
#[derive(Debug, Clone)]
pub struct ColumnWaterVaporEstimator {
    window: WindowSize,
    model: CwvModel,
}

impl ColumnWaterVaporEstimator {
    /// Window size is checked here, before any raster is read
    pub fn new(window_size: usize, model: CwvModel) -> LstResult<Self> {
        Ok(Self {
            window: WindowSize::new(window_size)?,
            model,
        })
    }

    pub fn with_window(window: WindowSize, model: CwvModel) -> Self {
        Self { window, model }
    }

    pub fn window(&self) -> WindowSize {
        self.window
    }

    pub fn model(&self) -> &CwvModel {
        &self.model
    }

    /// Estimate CWV (g/cm^2) from band 10 (`ti`) and band 11 (`tj`)
    /// brightness temperatures.
    pub fn estimate(&self, ti: &LstRaster, tj: &LstRaster) -> LstResult<StageOutput> {
        ensure_shape("channel j brightness temperature", tj, ti.dim())?;

        let (rows, cols) = ti.dim();
        log::info!(
            "Estimating column water vapor for {}x{} pixels, {}x{} window",
            rows,
            cols,
            self.window.get(),
            self.window.get()
        );
        log::debug!("CWV model: {}", self.model.citation());

        let pixel = |(row, col): (usize, usize), _: &f64| self.estimate_pixel(ti.view(), tj.view(), row, col);

        #[cfg(feature = "parallel")]
        let outcomes = Zip::indexed(ti).par_map_collect(pixel);
        #[cfg(not(feature = "parallel"))]
        let outcomes = Zip::indexed(ti).map_collect(pixel);

        let output = StageOutput::from_outcomes(outcomes);
        output.summary.log("column water vapor");
        if output.summary.no_data_percentage() > 50.0 {
            log::warn!(
                "More than half of the CWV raster is no-data ({:.1}%)",
                output.summary.no_data_percentage()
            );
        }
        Ok(output)
    }

    /// CWV for the window centred on (`row`, `col`)
    pub fn estimate_pixel(
        &self,
        ti: ArrayView2<f64>,
        tj: ArrayView2<f64>,
        row: usize,
        col: usize,
    ) -> Result<f64, DataFault> {
        let ratio = window_ratio(ti, tj, row, col, self.window)?;
        self.model.evaluate(ratio).ok_or(DataFault::RangeSelectionMiss)
    }
}

/// Covariance-variance ratio Rji over one full window
pub fn window_ratio(
    ti: ArrayView2<f64>,
    tj: ArrayView2<f64>,
    row: usize,
    col: usize,
    window: WindowSize,
) -> Result<f64, DataFault> {
    let (rows, cols) = ti.dim();
    let half = window.half();

    // Partial windows would bias the statistic
    if row < half || col < half || row + half >= rows || col + half >= cols {
        return Err(DataFault::IncompleteWindow);
    }

    let rs = s![row - half..=row + half, col - half..=col + half];
    let wi = ti.slice(rs);
    let wj = tj.slice(rs);

    if wi.iter().chain(wj.iter()).any(|&v| is_no_data(v)) {
        return Err(DataFault::NoDataInput);
    }

    let n = wi.len() as f64;
    let mean_i = wi.sum() / n;
    let mean_j = wj.sum() / n;

    let (covariance, variance) = Zip::from(&wi).and(&wj).fold((0.0, 0.0), |(cov, var), &a, &b| {
        let da = a - mean_i;
        (cov + da * (b - mean_j), var + da * da)
    });

    if variance < DEGENERATE_VARIANCE_EPSILON {
        return Err(DataFault::DegenerateVariance);
    }
    Ok(covariance / variance)
}
