use crate::types::{is_no_data, DataFault, LstError, LstRaster, LstReal, LstResult, StageOutput};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Per-band rescaling and thermal constants from scene metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConstants {
    /// Radiance multiplicative rescaling factor (RADIANCE_MULT_BAND_n)
    pub radiance_mult: f64,
    /// Radiance additive rescaling factor (RADIANCE_ADD_BAND_n)
    pub radiance_add: f64,
    /// Thermal conversion constant K1 (W/(m^2 sr um))
    pub k1: f64,
    /// Thermal conversion constant K2 (K)
    pub k2: f64,
}

/// Landsat 8 TIRS band 10 values as published in typical MTL files
pub const LANDSAT8_BAND10: CalibrationConstants = CalibrationConstants {
    radiance_mult: 3.3420e-04,
    radiance_add: 0.10000,
    k1: 774.8853,
    k2: 1321.0789,
};

/// Landsat 8 TIRS band 11 values as published in typical MTL files
pub const LANDSAT8_BAND11: CalibrationConstants = CalibrationConstants {
    radiance_mult: 3.3420e-04,
    radiance_add: 0.10000,
    k1: 480.8883,
    k2: 1201.1442,
};

impl CalibrationConstants {
    pub fn new(radiance_mult: f64, radiance_add: f64, k1: f64, k2: f64) -> LstResult<Self> {
        let constants = Self {
            radiance_mult,
            radiance_add,
            k1,
            k2,
        };
        constants.validate()?;
        Ok(constants)
    }

    pub fn validate(&self) -> LstResult<()> {
        if !self.radiance_mult.is_finite() || self.radiance_mult <= 0.0 {
            return Err(LstError::InvalidCalibration(format!(
                "radiance multiplicative factor must be > 0, got {}",
                self.radiance_mult
            )));
        }
        if !self.radiance_add.is_finite() {
            return Err(LstError::InvalidCalibration(format!(
                "radiance additive factor must be finite, got {}",
                self.radiance_add
            )));
        }
        if !self.k1.is_finite() || self.k1 <= 0.0 || !self.k2.is_finite() || self.k2 <= 0.0 {
            return Err(LstError::InvalidCalibration(format!(
                "thermal constants must be > 0, got K1={} K2={}",
                self.k1, self.k2
            )));
        }
        Ok(())
    }
}

/// DN -> radiance: L = DN * mult + add
#[inline]
pub fn dn_to_radiance(dn: LstReal, constants: &CalibrationConstants) -> LstReal {
    dn * constants.radiance_mult + constants.radiance_add
}

/// Radiance -> at-satellite brightness temperature: T = K2 / ln(K1 / L + 1)
#[inline]
pub fn radiance_to_brightness_temperature(radiance: LstReal, constants: &CalibrationConstants) -> LstReal {
    constants.k2 / (constants.k1 / radiance + 1.0).ln()
}

/// Inverse of [`radiance_to_brightness_temperature`]: L = K1 / (exp(K2 / T) - 1)
#[inline]
pub fn brightness_temperature_to_radiance(temperature: LstReal, constants: &CalibrationConstants) -> LstReal {
    constants.k1 / ((constants.k2 / temperature).exp() - 1.0)
}

/// Brightness temperature of one digital number
fn calibrate_pixel(dn: LstReal, constants: &CalibrationConstants) -> Result<LstReal, DataFault> {
    if is_no_data(dn) {
        return Err(DataFault::NoDataInput);
    }
    let radiance = dn_to_radiance(dn, constants);
    if radiance <= 0.0 {
        return Err(DataFault::NonPositiveRadiance);
    }
    let temperature = radiance_to_brightness_temperature(radiance, constants);
    if is_no_data(temperature) {
        return Err(DataFault::NonPositiveRadiance);
    }
    Ok(temperature)
}

/// Thermal band calibration processor
#[derive(Debug, Clone)]
pub struct ThermalCalibrator {
    constants: CalibrationConstants,
}

impl ThermalCalibrator {
    /// Create a calibrator; constants are validated here, before any raster work
    pub fn new(constants: CalibrationConstants) -> LstResult<Self> {
        constants.validate()?;
        Ok(Self { constants })
    }

    pub fn constants(&self) -> &CalibrationConstants {
        &self.constants
    }

    /// Convert digital numbers to spectral radiance, keeping no-data
    pub fn to_radiance(&self, dn: &LstRaster) -> LstRaster {
        let constants = self.constants;
        dn.mapv(|value| {
            if is_no_data(value) {
                value
            } else {
                dn_to_radiance(value, &constants)
            }
        })
    }

    /// Convert a digital number band to at-satellite brightness temperature (K)
    pub fn calibrate(&self, dn: &LstRaster) -> StageOutput {
        let (rows, cols) = dn.dim();
        log::info!("Calibrating {}x{} thermal band to brightness temperature", rows, cols);
        log::debug!("Calibration constants: {:?}", self.constants);

        let constants = self.constants;
        let outcomes = Zip::from(dn).map_collect(|&value| calibrate_pixel(value, &constants));
        let output = StageOutput::from_outcomes(outcomes);
        output.summary.log("calibration");
        output
    }

    /// Parallel calibration using Rayon
    #[cfg(feature = "parallel")]
    pub fn calibrate_parallel(&self, dn: &LstRaster) -> StageOutput {
        let (rows, cols) = dn.dim();
        log::info!("Calibrating {}x{} thermal band in parallel", rows, cols);

        let constants = self.constants;
        let outcomes = Zip::from(dn).par_map_collect(|&value| calibrate_pixel(value, &constants));
        let output = StageOutput::from_outcomes(outcomes);
        output.summary.log("calibration");
        output
    }

    #[cfg(not(feature = "parallel"))]
    pub fn calibrate_parallel(&self, dn: &LstRaster) -> StageOutput {
        self.calibrate(dn)
    }
}

/// One thermal channel as supplied by the caller
#[derive(Debug, Clone)]
pub enum ChannelInput {
    /// Raw digital numbers plus the band's calibration constants
    DigitalNumbers {
        dn: LstRaster,
        constants: CalibrationConstants,
    },
    /// Already calibrated brightness temperature (K); calibration is skipped
    BrightnessTemperature(LstRaster),
}

impl ChannelInput {
    /// Build from the loose optional form accepted at the boundary.
    ///
    /// Exactly one of `dn` (with constants) or `temperature` must be given.
    pub fn from_options(
        channel: &str,
        dn: Option<LstRaster>,
        constants: Option<CalibrationConstants>,
        temperature: Option<LstRaster>,
    ) -> LstResult<Self> {
        match (dn, temperature) {
            (Some(_), Some(_)) => Err(LstError::ConflictingInputs(format!(
                "channel {}: digital numbers and brightness temperature are mutually exclusive",
                channel
            ))),
            (None, None) => Err(LstError::MissingInput(format!(
                "channel {}: need digital numbers or brightness temperature",
                channel
            ))),
            (Some(dn), None) => {
                let constants = constants.ok_or_else(|| {
                    LstError::MissingInput(format!(
                        "channel {}: digital numbers require calibration constants",
                        channel
                    ))
                })?;
                constants.validate()?;
                Ok(ChannelInput::DigitalNumbers { dn, constants })
            }
            (None, Some(temperature)) => Ok(ChannelInput::BrightnessTemperature(temperature)),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        match self {
            ChannelInput::DigitalNumbers { dn, .. } => dn.dim(),
            ChannelInput::BrightnessTemperature(t) => t.dim(),
        }
    }

    /// Check constants without touching the raster
    pub fn validate(&self) -> LstResult<()> {
        match self {
            ChannelInput::DigitalNumbers { constants, .. } => constants.validate(),
            ChannelInput::BrightnessTemperature(_) => Ok(()),
        }
    }

    /// Brightness temperature for this channel, calibrating when needed
    pub fn into_brightness_temperature(self) -> LstResult<StageOutput> {
        match self {
            ChannelInput::DigitalNumbers { dn, constants } => {
                let calibrator = ThermalCalibrator::new(constants)?;
                Ok(calibrator.calibrate_parallel(&dn))
            }
            ChannelInput::BrightnessTemperature(temperature) => {
                log::debug!("Using supplied brightness temperature, calibration bypassed");
                let outcomes = temperature.mapv(|t| if is_no_data(t) { Err(DataFault::NoDataInput) } else { Ok(t) });
                Ok(StageOutput::from_outcomes(outcomes))
            }
        }
    }
}
