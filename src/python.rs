//! Python bindings, built with the `python` feature.

use crate::core::calibrate::{CalibrationConstants, ThermalCalibrator};
use crate::core::coefficients::CwvModel;
use crate::core::pipeline::{PipelineConfig, SplitWindowPipeline};
use crate::core::split_window::CoefficientSelection;
use crate::core::water_vapor::ColumnWaterVaporEstimator;
use crate::types::LstError;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

impl From<LstError> for PyErr {
    fn from(err: LstError) -> PyErr {
        if err.is_configuration_error() {
            PyValueError::new_err(err.to_string())
        } else {
            PyRuntimeError::new_err(err.to_string())
        }
    }
}

/// Brightness temperature (K) from a digital number band
#[pyfunction]
fn brightness_temperature<'py>(
    py: Python<'py>,
    dn: PyReadonlyArray2<f64>,
    radiance_mult: f64,
    radiance_add: f64,
    k1: f64,
    k2: f64,
) -> PyResult<&'py PyArray2<f64>> {
    let constants = CalibrationConstants::new(radiance_mult, radiance_add, k1, k2)?;
    let calibrator = ThermalCalibrator::new(constants)?;
    let dn = dn.as_array().to_owned();
    let output = py.allow_threads(|| calibrator.calibrate_parallel(&dn));
    Ok(output.raster.into_pyarray(py))
}

/// Column water vapor (g/cm^2) from band 10 and 11 brightness temperatures
#[pyfunction]
#[pyo3(signature = (t10, t11, window_size = 3))]
fn column_water_vapor<'py>(
    py: Python<'py>,
    t10: PyReadonlyArray2<f64>,
    t11: PyReadonlyArray2<f64>,
    window_size: usize,
) -> PyResult<&'py PyArray2<f64>> {
    let estimator = ColumnWaterVaporEstimator::new(window_size, CwvModel::default())?;
    let ti = t10.as_array().to_owned();
    let tj = t11.as_array().to_owned();
    let output = py.allow_threads(|| estimator.estimate(&ti, &tj))?;
    Ok(output.raster.into_pyarray(py))
}

/// Full retrieval from brightness temperatures.
///
/// Returns a dict with `lst`, `cwv` and `lst_no_data_percentage`.
#[pyfunction]
#[pyo3(signature = (t10, t11, emissivity_class = None, landcover = None, window_size = 3, full_range = false, seed = None))]
#[allow(clippy::too_many_arguments)]
fn land_surface_temperature<'py>(
    py: Python<'py>,
    t10: PyReadonlyArray2<f64>,
    t11: PyReadonlyArray2<f64>,
    emissivity_class: Option<String>,
    landcover: Option<PyReadonlyArray2<f64>>,
    window_size: usize,
    full_range: bool,
    seed: Option<u64>,
) -> PyResult<&'py PyDict> {
    let mut builder = PipelineConfig::builder()
        .band10_temperature(t10.as_array().to_owned())
        .band11_temperature(t11.as_array().to_owned())
        .window_size(window_size);
    if let Some(class) = emissivity_class {
        builder = builder.emissivity_class(class);
    }
    if let Some(landcover) = landcover {
        builder = builder.landcover(landcover.as_array().to_owned());
    }
    if full_range {
        builder = builder.coefficient_selection(CoefficientSelection::FullRange);
    }
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    let config = builder.build()?;

    let product = py.allow_threads(|| SplitWindowPipeline::new(config).run())?;

    let result = PyDict::new(py);
    result.set_item("lst_no_data_percentage", product.lst.summary.no_data_percentage())?;
    if let Some(class) = product.emissivity_class() {
        result.set_item("emissivity_class", class.to_string())?;
    }
    result.set_item("lst", product.lst.raster.into_pyarray(py))?;
    result.set_item("cwv", product.cwv.raster.into_pyarray(py))?;
    Ok(result)
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(brightness_temperature, m)?)?;
    m.add_function(wrap_pyfunction!(column_water_vapor, m)?)?;
    m.add_function(wrap_pyfunction!(land_surface_temperature, m)?)?;
    Ok(())
}
