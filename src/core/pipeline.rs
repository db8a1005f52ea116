//! End-to-end split-window run: mask, calibrate, emissivity, CWV, LST.
//!
//! All configuration is checked in [`PipelineConfigBuilder::build`], so a
//! [`PipelineConfig`] that exists is one that can run. Nothing inside
//! [`SplitWindowPipeline::run`] fails because of a single pixel.

use crate::core::calibrate::{CalibrationConstants, ChannelInput};
use crate::core::coefficients::{CwvModel, LandCoverClass, DU_2015_CITATION};
use crate::core::emissivity::{EmissivityInputs, EmissivityResolver, EmissivitySource, ResolvedEmissivity};
use crate::core::masking::{apply_mask, CloudMapMask, CloudMask, MaskProvider, QaPixelMask};
use crate::core::split_window::{CoefficientSelection, SplitWindowEstimator};
use crate::core::water_vapor::{ColumnWaterVaporEstimator, WindowSize};
use crate::io::MetadataSource;
use crate::types::{ensure_shape, kelvin_to_celsius, FaultSummary, LstError, LstRaster, LstResult, StageOutput};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// TIRS band holding channel i
pub const BAND_I: u8 = 10;
/// TIRS band holding channel j
pub const BAND_J: u8 = 11;

/// Validated, immutable run configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    channel_i: ChannelInput,
    channel_j: ChannelInput,
    emissivity: EmissivitySource,
    window: WindowSize,
    cwv_model: CwvModel,
    coefficient_selection: CoefficientSelection,
    mask: Option<CloudMask>,
    seed: Option<u64>,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Raster shape every input shares
    pub fn shape(&self) -> (usize, usize) {
        self.channel_i.dim()
    }

    pub fn window(&self) -> WindowSize {
        self.window
    }

    pub fn coefficient_selection(&self) -> CoefficientSelection {
        self.coefficient_selection
    }

    pub fn emissivity(&self) -> &EmissivitySource {
        &self.emissivity
    }

    pub fn mask(&self) -> Option<&CloudMask> {
        self.mask.as_ref()
    }
}

/// Collects the loose inputs of a run
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    band10_dn: Option<LstRaster>,
    band10_constants: Option<CalibrationConstants>,
    band10_temperature: Option<LstRaster>,
    band11_dn: Option<LstRaster>,
    band11_constants: Option<CalibrationConstants>,
    band11_temperature: Option<LstRaster>,
    landcover: Option<LstRaster>,
    emissivity_class: Option<String>,
    average_emissivity: Option<LstRaster>,
    delta_emissivity: Option<LstRaster>,
    window_size: Option<usize>,
    cwv_model: Option<CwvModel>,
    coefficient_selection: CoefficientSelection,
    qa_mask: Option<QaPixelMask>,
    cloud_map: Option<LstRaster>,
    seed: Option<u64>,
}

impl PipelineConfigBuilder {
    pub fn band10_digital_numbers(mut self, dn: LstRaster, constants: CalibrationConstants) -> Self {
        self.band10_dn = Some(dn);
        self.band10_constants = Some(constants);
        self
    }

    pub fn band11_digital_numbers(mut self, dn: LstRaster, constants: CalibrationConstants) -> Self {
        self.band11_dn = Some(dn);
        self.band11_constants = Some(constants);
        self
    }

    pub fn band10_temperature(mut self, temperature: LstRaster) -> Self {
        self.band10_temperature = Some(temperature);
        self
    }

    pub fn band11_temperature(mut self, temperature: LstRaster) -> Self {
        self.band11_temperature = Some(temperature);
        self
    }

    /// Raw bands 10 and 11 with constants from scene metadata
    pub fn digital_numbers_from_metadata(
        self,
        band10: LstRaster,
        band11: LstRaster,
        metadata: &impl MetadataSource,
    ) -> LstResult<Self> {
        log::info!("Reading calibration constants for scene {}", metadata.scene_id());
        let c10 = metadata.calibration_constants(BAND_I)?;
        let c11 = metadata.calibration_constants(BAND_J)?;
        Ok(self
            .band10_digital_numbers(band10, c10)
            .band11_digital_numbers(band11, c11))
    }

    pub fn landcover(mut self, landcover: LstRaster) -> Self {
        self.landcover = Some(landcover);
        self
    }

    /// Fixed emissivity class by name, e.g. "Cropland" or "Random"
    pub fn emissivity_class(mut self, class: impl Into<String>) -> Self {
        self.emissivity_class = Some(class.into());
        self
    }

    pub fn explicit_emissivity(mut self, average: LstRaster, delta: LstRaster) -> Self {
        self.average_emissivity = Some(average);
        self.delta_emissivity = Some(delta);
        self
    }

    /// Average emissivity map; alone it replaces that half of the land cover lookup
    pub fn average_emissivity(mut self, average: LstRaster) -> Self {
        self.average_emissivity = Some(average);
        self
    }

    /// Delta emissivity map; alone it replaces that half of the land cover lookup
    pub fn delta_emissivity(mut self, delta: LstRaster) -> Self {
        self.delta_emissivity = Some(delta);
        self
    }

    pub fn window_size(mut self, window_size: usize) -> Self {
        self.window_size = Some(window_size);
        self
    }

    pub fn cwv_model(mut self, model: CwvModel) -> Self {
        self.cwv_model = Some(model);
        self
    }

    pub fn coefficient_selection(mut self, selection: CoefficientSelection) -> Self {
        self.coefficient_selection = selection;
        self
    }

    pub fn qa_mask(mut self, mask: QaPixelMask) -> Self {
        self.qa_mask = Some(mask);
        self
    }

    pub fn cloud_map(mut self, cloud_map: LstRaster) -> Self {
        self.cloud_map = Some(cloud_map);
        self
    }

    /// Seed for the `Random` emissivity class
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate everything and freeze the configuration
    pub fn build(self) -> LstResult<PipelineConfig> {
        let window = WindowSize::new(self.window_size.unwrap_or_else(|| WindowSize::default().get()))?;

        let channel_i = ChannelInput::from_options(
            "10",
            self.band10_dn,
            self.band10_constants,
            self.band10_temperature,
        )?;
        let channel_j = ChannelInput::from_options(
            "11",
            self.band11_dn,
            self.band11_constants,
            self.band11_temperature,
        )?;

        let emissivity_class = self
            .emissivity_class
            .as_deref()
            .map(str::parse::<LandCoverClass>)
            .transpose()?;

        let emissivity = EmissivityInputs {
            landcover: self.landcover,
            emissivity_class,
            average_emissivity: self.average_emissivity,
            delta_emissivity: self.delta_emissivity,
        }
        .into_source()?;

        let mask = match (self.qa_mask, self.cloud_map) {
            (Some(_), Some(_)) => {
                return Err(LstError::ConflictingInputs(
                    "QA band mask and cloud map are mutually exclusive".to_string(),
                ))
            }
            (Some(qa), None) => Some(CloudMask::QaPixel(qa)),
            (None, Some(clouds)) => Some(CloudMask::CloudMap(CloudMapMask::new(clouds))),
            (None, None) => None,
        };

        let shape = channel_i.dim();
        if channel_j.dim() != shape {
            return Err(LstError::ShapeMismatch {
                name: "band 11".to_string(),
                expected: shape,
                actual: channel_j.dim(),
            });
        }
        match &emissivity {
            EmissivitySource::LandCoverMap(map) => ensure_shape("land cover", map, shape)?,
            EmissivitySource::Explicit { average, delta } => {
                ensure_shape("average emissivity", average, shape)?;
                ensure_shape("delta emissivity", delta, shape)?;
            }
            EmissivitySource::LandCoverWithOverride {
                landcover,
                average,
                delta,
            } => {
                ensure_shape("land cover", landcover, shape)?;
                if let Some(average) = average {
                    ensure_shape("average emissivity", average, shape)?;
                }
                if let Some(delta) = delta {
                    ensure_shape("delta emissivity", delta, shape)?;
                }
            }
            EmissivitySource::FixedClass(_) => {}
        }
        match &mask {
            Some(CloudMask::QaPixel(qa)) => ensure_shape("QA band", &qa.qa_band, shape)?,
            Some(CloudMask::CloudMap(clouds)) => ensure_shape("cloud map", &clouds.cloud_map, shape)?,
            None => {}
        }

        Ok(PipelineConfig {
            channel_i,
            channel_j,
            emissivity,
            window,
            cwv_model: self.cwv_model.unwrap_or_default(),
            coefficient_selection: self.coefficient_selection,
            mask,
            seed: self.seed,
        })
    }
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct LstProduct {
    pub brightness_temperature_i: StageOutput,
    pub brightness_temperature_j: StageOutput,
    pub emissivity: ResolvedEmissivity,
    pub cwv: StageOutput,
    /// Land surface temperature (K)
    pub lst: StageOutput,
}

impl LstProduct {
    /// LST in degrees Celsius
    pub fn lst_celsius(&self) -> LstRaster {
        kelvin_to_celsius(&self.lst.raster)
    }

    /// Class used in fixed-class mode
    pub fn emissivity_class(&self) -> Option<LandCoverClass> {
        self.emissivity.class()
    }

    /// Per-stage no-data tallies in run order
    pub fn summaries(&self) -> Vec<(&'static str, &FaultSummary)> {
        let mut summaries = vec![
            ("brightness temperature 10", &self.brightness_temperature_i.summary),
            ("brightness temperature 11", &self.brightness_temperature_j.summary),
        ];
        if let ResolvedEmissivity::PerPixel { average, delta } = &self.emissivity {
            summaries.push(("average emissivity", &average.summary));
            summaries.push(("delta emissivity", &delta.summary));
        }
        summaries.push(("column water vapor", &self.cwv.summary));
        summaries.push(("land surface temperature", &self.lst.summary));
        summaries
    }
}

/// Split-window LST pipeline
#[derive(Debug, Clone)]
pub struct SplitWindowPipeline {
    config: PipelineConfig,
}

impl SplitWindowPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all stages
    pub fn run(self) -> LstResult<LstProduct> {
        let PipelineConfig {
            mut channel_i,
            mut channel_j,
            emissivity,
            window,
            cwv_model,
            coefficient_selection,
            mask,
            seed,
        } = self.config;

        let (rows, cols) = channel_i.dim();
        log::info!("Starting split-window LST retrieval for {}x{} scene", rows, cols);
        log::info!("Citation: {}", DU_2015_CITATION);

        if let Some(mask) = &mask {
            log::info!("Masking clouds using {}", mask.describe());
            let cells = mask.mask((rows, cols))?;
            log::debug!("{} cells masked", cells.iter().filter(|&&m| m).count());
            channel_i = mask_channel(channel_i, &cells)?;
            channel_j = mask_channel(channel_j, &cells)?;
        }

        #[cfg(feature = "parallel")]
        let (ti, tj) = rayon::join(
            || channel_i.into_brightness_temperature(),
            || channel_j.into_brightness_temperature(),
        );
        #[cfg(not(feature = "parallel"))]
        let (ti, tj) = (
            channel_i.into_brightness_temperature(),
            channel_j.into_brightness_temperature(),
        );
        let (ti, tj) = (ti?, tj?);

        let resolver = EmissivityResolver::new(emissivity);
        let resolved = match seed {
            Some(seed) => resolver.resolve_with_rng(&mut StdRng::seed_from_u64(seed))?,
            None => resolver.resolve()?,
        };

        let cwv_estimator = ColumnWaterVaporEstimator::with_window(window, cwv_model);
        let cwv = cwv_estimator.estimate(&ti.raster, &tj.raster)?;

        let lst_estimator = SplitWindowEstimator::new(coefficient_selection);
        let lst = match &resolved {
            ResolvedEmissivity::Uniform { average, delta, .. } => {
                lst_estimator.estimate_lst_uniform(&ti.raster, &tj.raster, *average, *delta, Some(&cwv.raster))?
            }
            ResolvedEmissivity::PerPixel { average, delta } => lst_estimator.estimate_lst(
                &ti.raster,
                &tj.raster,
                &average.raster,
                &delta.raster,
                Some(&cwv.raster),
            )?,
        };

        if lst.summary.no_data_pixels() == lst.summary.total_pixels && lst.summary.total_pixels > 0 {
            log::warn!("Land surface temperature raster is entirely no-data");
        }
        log::info!("Split-window LST retrieval completed");

        Ok(LstProduct {
            brightness_temperature_i: ti,
            brightness_temperature_j: tj,
            emissivity: resolved,
            cwv,
            lst,
        })
    }
}

fn mask_channel(channel: ChannelInput, cells: &ndarray::Array2<bool>) -> LstResult<ChannelInput> {
    Ok(match channel {
        ChannelInput::DigitalNumbers { dn, constants } => ChannelInput::DigitalNumbers {
            dn: apply_mask(&dn, cells)?,
            constants,
        },
        ChannelInput::BrightnessTemperature(t) => ChannelInput::BrightnessTemperature(apply_mask(&t, cells)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibrate::{brightness_temperature_to_radiance, LANDSAT8_BAND10, LANDSAT8_BAND11};
    use ndarray::Array2;

    fn temperatures(shape: (usize, usize)) -> (LstRaster, LstRaster) {
        let ti = Array2::from_shape_fn(shape, |(i, j)| 295.0 + 0.4 * i as f64 + 0.25 * j as f64);
        let tj = ti.mapv(|t| 1.08 * t - 24.0);
        (ti, tj)
    }

    #[test]
    fn test_builder_rejects_bad_window_first() {
        let (ti, tj) = temperatures((5, 5));
        let result = PipelineConfig::builder()
            .band10_temperature(ti)
            .band11_temperature(tj)
            .emissivity_class("Forest")
            .window_size(4)
            .build();
        assert!(matches!(result, Err(LstError::InvalidWindowSize(4))));
    }

    #[test]
    fn test_builder_rejects_unknown_class() {
        let (ti, tj) = temperatures((5, 5));
        let result = PipelineConfig::builder()
            .band10_temperature(ti)
            .band11_temperature(tj)
            .emissivity_class("Desert")
            .build();
        assert!(matches!(result, Err(LstError::UnknownClass(name)) if name == "Desert"));
    }

    #[test]
    fn test_builder_rejects_conflicting_masks() {
        let (ti, tj) = temperatures((5, 5));
        let result = PipelineConfig::builder()
            .band10_temperature(ti.clone())
            .band11_temperature(tj)
            .emissivity_class("Forest")
            .qa_mask(QaPixelMask::new(Array2::zeros((5, 5))))
            .cloud_map(Array2::zeros((5, 5)))
            .build();
        assert!(matches!(result, Err(LstError::ConflictingInputs(_))));
    }

    #[test]
    fn test_builder_checks_shapes() {
        let (ti, _) = temperatures((5, 5));
        let (_, tj) = temperatures((5, 6));
        let result = PipelineConfig::builder()
            .band10_temperature(ti)
            .band11_temperature(tj)
            .emissivity_class("Forest")
            .build();
        assert!(matches!(result, Err(LstError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_run_from_digital_numbers() {
        let (ti, tj) = temperatures((6, 6));
        // Invert calibration so the DN bands reproduce the temperatures
        let dn10 = ti.mapv(|t| {
            (brightness_temperature_to_radiance(t, &LANDSAT8_BAND10) - LANDSAT8_BAND10.radiance_add)
                / LANDSAT8_BAND10.radiance_mult
        });
        let dn11 = tj.mapv(|t| {
            (brightness_temperature_to_radiance(t, &LANDSAT8_BAND11) - LANDSAT8_BAND11.radiance_add)
                / LANDSAT8_BAND11.radiance_mult
        });

        let config = PipelineConfig::builder()
            .band10_digital_numbers(dn10, LANDSAT8_BAND10)
            .band11_digital_numbers(dn11, LANDSAT8_BAND11)
            .emissivity_class("Cropland")
            .build()
            .unwrap();
        let product = SplitWindowPipeline::new(config).run().unwrap();

        assert!((product.brightness_temperature_i.raster[[2, 2]] - ti[[2, 2]]).abs() < 1e-6);
        assert!(product.cwv.raster[[2, 2]].is_finite());
        assert!(product.lst.raster[[2, 2]].is_finite());
        assert!(product.lst.raster[[0, 0]].is_nan());
        assert_eq!(product.emissivity_class(), Some(LandCoverClass::Cropland));
    }

    #[test]
    fn test_mask_removes_pixels_from_every_stage() {
        let (ti, tj) = temperatures((7, 7));
        let mut qa = Array2::from_elem((7, 7), 2720.0);
        qa[[3, 3]] = 61440.0;

        let config = PipelineConfig::builder()
            .band10_temperature(ti)
            .band11_temperature(tj)
            .emissivity_class("Forest")
            .qa_mask(QaPixelMask::new(qa))
            .build()
            .unwrap();
        let product = SplitWindowPipeline::new(config).run().unwrap();

        assert!(product.brightness_temperature_i.raster[[3, 3]].is_nan());
        assert!(product.lst.raster[[3, 3]].is_nan());
        // Every window touching (3, 3) loses its CWV
        assert!(product.cwv.raster[[2, 2]].is_nan());
        assert!(product.cwv.raster[[5, 5]].is_finite());
    }

    #[test]
    fn test_single_emissivity_map_with_landcover() {
        let (ti, tj) = temperatures((5, 5));
        let config = PipelineConfig::builder()
            .band10_temperature(ti.clone())
            .band11_temperature(tj.clone())
            .landcover(Array2::from_elem((5, 5), 10.0))
            .average_emissivity(Array2::from_elem((5, 5), 0.98))
            .build()
            .unwrap();
        assert!(matches!(
            config.emissivity(),
            EmissivitySource::LandCoverWithOverride { average: Some(_), delta: None, .. }
        ));

        let product = SplitWindowPipeline::new(config).run().unwrap();
        match &product.emissivity {
            ResolvedEmissivity::PerPixel { average, delta } => {
                assert_eq!(average.raster[[2, 2]], 0.98);
                let cropland = LandCoverClass::Cropland.emissivity().unwrap();
                assert!((delta.raster[[2, 2]] - cropland.delta()).abs() < 1e-12);
            }
            other => panic!("expected per-pixel emissivity, got {:?}", other),
        }
        assert!(product.lst.raster[[2, 2]].is_finite());

        let without_landcover = PipelineConfig::builder()
            .band10_temperature(ti)
            .band11_temperature(tj)
            .emissivity_class("Cropland")
            .delta_emissivity(Array2::from_elem((5, 5), 0.003))
            .build();
        assert!(matches!(without_landcover, Err(LstError::MissingInput(_))));
    }

    #[test]
    fn test_summaries_in_run_order() {
        let (ti, tj) = temperatures((5, 5));
        let config = PipelineConfig::builder()
            .band10_temperature(ti)
            .band11_temperature(tj)
            .landcover(Array2::from_elem((5, 5), 10.0))
            .build()
            .unwrap();
        let product = SplitWindowPipeline::new(config).run().unwrap();
        let names: Vec<&str> = product.summaries().iter().map(|(name, _)| *name).collect();
        assert_eq!(names.first(), Some(&"brightness temperature 10"));
        assert_eq!(names.last(), Some(&"land surface temperature"));
        assert_eq!(names.len(), 6);
    }
}
