//! Land surface emissivity for the split-window equation.
//!
//! Produces the average emissivity ε and the channel difference Δε either as
//! scene-wide scalars (one fixed land cover class) or as rasters (per-pixel
//! FROM-GLC lookup, or an expert-supplied pair used verbatim).

use crate::core::coefficients::{emissivity_for_code, ClassEmissivity, LandCoverClass};
use crate::types::{ensure_shape, is_no_data, DataFault, LstError, LstRaster, LstResult, StageOutput};
use ndarray::{Array2, Zip};
use rand::seq::SliceRandom;
use rand::Rng;

/// Where emissivity comes from; exactly one per run
#[derive(Debug, Clone)]
pub enum EmissivitySource {
    /// One class for the whole scene
    FixedClass(LandCoverClass),
    /// FROM-GLC land cover raster, looked up per pixel
    LandCoverMap(LstRaster),
    /// Land cover lookup with one half of the pair supplied by the caller
    LandCoverWithOverride {
        landcover: LstRaster,
        average: Option<LstRaster>,
        delta: Option<LstRaster>,
    },
    /// Expert override, used as is
    Explicit { average: LstRaster, delta: LstRaster },
}

/// Loose emissivity options as a caller may collect them
#[derive(Debug, Clone, Default)]
pub struct EmissivityInputs {
    pub landcover: Option<LstRaster>,
    pub emissivity_class: Option<LandCoverClass>,
    pub average_emissivity: Option<LstRaster>,
    pub delta_emissivity: Option<LstRaster>,
}

impl EmissivityInputs {
    /// Collapse the options into a single source.
    ///
    /// An explicit average/delta pair wins over everything else. A single
    /// map replaces its half of the land cover lookup and needs a land cover
    /// map. Otherwise exactly one of land cover map or fixed class is required.
    pub fn into_source(self) -> LstResult<EmissivitySource> {
        if self.landcover.is_some() && self.emissivity_class.is_some() {
            return Err(LstError::ConflictingInputs(
                "land cover map and fixed emissivity class are mutually exclusive".to_string(),
            ));
        }

        match (self.average_emissivity, self.delta_emissivity) {
            (Some(average), Some(delta)) => {
                if self.landcover.is_some() || self.emissivity_class.is_some() {
                    log::debug!("Explicit emissivity maps supplied, land cover lookup bypassed");
                }
                Ok(EmissivitySource::Explicit { average, delta })
            }
            (None, None) => match (self.landcover, self.emissivity_class) {
                (Some(map), None) => Ok(EmissivitySource::LandCoverMap(map)),
                (None, Some(class)) => Ok(EmissivitySource::FixedClass(class)),
                _ => Err(LstError::MissingInput(
                    "need a land cover map or a fixed emissivity class".to_string(),
                )),
            },
            (average, delta) => {
                let landcover = self.landcover.ok_or_else(|| {
                    let given = if average.is_some() { "average" } else { "delta" };
                    LstError::MissingInput(format!(
                        "{} emissivity map alone needs a land cover map for the other half",
                        given
                    ))
                })?;
                Ok(EmissivitySource::LandCoverWithOverride {
                    landcover,
                    average,
                    delta,
                })
            }
        }
    }
}

/// Emissivity terms ready for the LST estimator
#[derive(Debug, Clone)]
pub enum ResolvedEmissivity {
    /// Scalars for every pixel
    Uniform {
        class: LandCoverClass,
        average: f64,
        delta: f64,
    },
    /// One value per pixel
    PerPixel {
        average: StageOutput,
        delta: StageOutput,
    },
}

impl ResolvedEmissivity {
    /// The class actually used in fixed-class mode
    pub fn class(&self) -> Option<LandCoverClass> {
        match self {
            ResolvedEmissivity::Uniform { class, .. } => Some(*class),
            ResolvedEmissivity::PerPixel { .. } => None,
        }
    }
}

/// Emissivity resolver
#[derive(Debug, Clone)]
pub struct EmissivityResolver {
    source: EmissivitySource,
}

impl EmissivityResolver {
    pub fn new(source: EmissivitySource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &EmissivitySource {
        &self.source
    }

    /// Resolve using the thread RNG for the `Random` class
    pub fn resolve(self) -> LstResult<ResolvedEmissivity> {
        self.resolve_with_rng(&mut rand::thread_rng())
    }

    /// Resolve with a caller supplied RNG
    pub fn resolve_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> LstResult<ResolvedEmissivity> {
        match self.source {
            EmissivitySource::FixedClass(class) => {
                let lse = resolve_fixed_class(class, rng)?;
                log::info!(
                    "Emissivity fixed to class {}: average {:.4}, delta {:.4} (channels 10, 11: {}, {})",
                    lse.class,
                    lse.average(),
                    lse.delta(),
                    lse.channel_10,
                    lse.channel_11
                );
                Ok(ResolvedEmissivity::Uniform {
                    class: lse.class,
                    average: lse.average(),
                    delta: lse.delta(),
                })
            }
            EmissivitySource::LandCoverMap(landcover) => {
                let (average, delta) = emissivity_from_landcover(&landcover);
                Ok(ResolvedEmissivity::PerPixel { average, delta })
            }
            EmissivitySource::LandCoverWithOverride {
                landcover,
                average,
                delta,
            } => {
                let (looked_up_average, looked_up_delta) = emissivity_from_landcover(&landcover);
                let average = match average {
                    Some(map) => {
                        ensure_shape("average emissivity", &map, landcover.dim())?;
                        log::info!("Using supplied average emissivity map");
                        passthrough(map)
                    }
                    None => looked_up_average,
                };
                let delta = match delta {
                    Some(map) => {
                        ensure_shape("delta emissivity", &map, landcover.dim())?;
                        log::info!("Using supplied delta emissivity map");
                        passthrough(map)
                    }
                    None => looked_up_delta,
                };
                Ok(ResolvedEmissivity::PerPixel { average, delta })
            }
            EmissivitySource::Explicit { average, delta } => {
                ensure_shape("delta emissivity", &delta, average.dim())?;
                log::info!("Using supplied average and delta emissivity maps");
                Ok(ResolvedEmissivity::PerPixel {
                    average: passthrough(average),
                    delta: passthrough(delta),
                })
            }
        }
    }
}

/// Emissivity record for a fixed class; `Random` draws one real class
pub fn resolve_fixed_class<R: Rng + ?Sized>(class: LandCoverClass, rng: &mut R) -> LstResult<ClassEmissivity> {
    let class = if class.is_random() {
        let picked = *LandCoverClass::REAL_CLASSES
            .choose(rng)
            .ok_or_else(|| LstError::UnknownClass(class.to_string()))?;
        log::warn!("Random emissivity class selected: {} (testing only)", picked);
        picked
    } else {
        class
    };
    class.emissivity()
}

/// Per-pixel average and delta emissivity from a FROM-GLC raster
pub fn emissivity_from_landcover(landcover: &LstRaster) -> (StageOutput, StageOutput) {
    let (rows, cols) = landcover.dim();
    log::info!("Determining land surface emissivity for {}x{} land cover map", rows, cols);

    let lookup = |&code: &f64| -> Result<ClassEmissivity, DataFault> {
        if is_no_data(code) {
            return Err(DataFault::NoDataInput);
        }
        emissivity_for_code(code).ok_or(DataFault::UnmappedLandCover)
    };

    #[cfg(feature = "parallel")]
    let records: Array2<Result<ClassEmissivity, DataFault>> = Zip::from(landcover).par_map_collect(lookup);
    #[cfg(not(feature = "parallel"))]
    let records: Array2<Result<ClassEmissivity, DataFault>> = Zip::from(landcover).map_collect(lookup);

    let average = StageOutput::from_outcomes(records.mapv(|r| r.map(|lse| lse.average())));
    let delta = StageOutput::from_outcomes(records.mapv(|r| r.map(|lse| lse.delta())));

    average.summary.log("average emissivity");
    delta.summary.log("delta emissivity");
    (average, delta)
}

fn passthrough(raster: LstRaster) -> StageOutput {
    StageOutput::from_outcomes(raster.mapv(|v| if is_no_data(v) { Err(DataFault::NoDataInput) } else { Ok(v) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_DATA;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fixed_class_resolution() {
        let resolved = EmissivityResolver::new(EmissivitySource::FixedClass(LandCoverClass::Forest))
            .resolve()
            .unwrap();
        match resolved {
            ResolvedEmissivity::Uniform { class, average, delta } => {
                assert_eq!(class, LandCoverClass::Forest);
                assert!((average - 0.9955).abs() < 1e-12);
                assert!((delta + 0.001).abs() < 1e-12);
            }
            other => panic!("expected uniform emissivity, got {:?}", other),
        }
    }

    #[test]
    fn test_random_class_is_a_real_class() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let lse = resolve_fixed_class(LandCoverClass::Random, &mut rng).unwrap();
            assert!(!lse.class.is_random());
            assert!(LandCoverClass::REAL_CLASSES.contains(&lse.class));
        }
    }

    #[test]
    fn test_random_class_is_reproducible_with_seed() {
        let pick = |seed| {
            EmissivityResolver::new(EmissivitySource::FixedClass(LandCoverClass::Random))
                .resolve_with_rng(&mut StdRng::seed_from_u64(seed))
                .unwrap()
                .class()
        };
        assert_eq!(pick(42), pick(42));
    }

    #[test]
    fn test_landcover_map_with_only_known_codes() {
        let landcover = array![[10.0, 20.0, 30.0], [41.0, 61.0, 82.0], [91.0, 101.0, 72.0]];
        let (average, delta) = emissivity_from_landcover(&landcover);
        assert_eq!(average.summary.no_data_pixels(), 0);
        assert_eq!(delta.summary.no_data_pixels(), 0);
        assert!(average.raster.iter().all(|v| v.is_finite()));

        let water = LandCoverClass::Waterbodies.emissivity().unwrap();
        assert!((average.raster[[1, 1]] - water.average()).abs() < 1e-12);
        assert!((delta.raster[[1, 1]] - water.delta()).abs() < 1e-12);
    }

    #[test]
    fn test_unlisted_code_yields_single_no_data_pixel() {
        let landcover = array![[10.0, 20.0, 30.0], [40.0, 120.0, 60.0], [70.0, 80.0, 90.0]];
        let (average, delta) = emissivity_from_landcover(&landcover);

        for output in [&average, &delta] {
            assert_eq!(output.summary.no_data_pixels(), 1);
            assert_eq!(output.summary.count(DataFault::UnmappedLandCover), 1);
            assert!(output.raster[[1, 1]].is_nan());
        }
    }

    #[test]
    fn test_no_data_landcover_propagates() {
        let landcover = array![[NO_DATA, 20.0]];
        let (average, _) = emissivity_from_landcover(&landcover);
        assert!(average.raster[[0, 0]].is_nan());
        assert_eq!(average.summary.count(DataFault::NoDataInput), 1);
    }

    #[test]
    fn test_explicit_maps_take_precedence() {
        let inputs = EmissivityInputs {
            landcover: Some(array![[10.0]]),
            emissivity_class: None,
            average_emissivity: Some(array![[0.98]]),
            delta_emissivity: Some(array![[0.002]]),
        };
        let resolved = EmissivityResolver::new(inputs.into_source().unwrap())
            .resolve()
            .unwrap();
        match resolved {
            ResolvedEmissivity::PerPixel { average, delta } => {
                assert_eq!(average.raster[[0, 0]], 0.98);
                assert_eq!(delta.raster[[0, 0]], 0.002);
            }
            other => panic!("expected per-pixel emissivity, got {:?}", other),
        }
    }

    #[test]
    fn test_input_validation() {
        let both = EmissivityInputs {
            landcover: Some(array![[10.0]]),
            emissivity_class: Some(LandCoverClass::Forest),
            ..Default::default()
        };
        assert!(matches!(both.into_source(), Err(LstError::ConflictingInputs(_))));

        let neither = EmissivityInputs::default();
        assert!(matches!(neither.into_source(), Err(LstError::MissingInput(_))));

        let half_pair_without_map = EmissivityInputs {
            emissivity_class: Some(LandCoverClass::Forest),
            average_emissivity: Some(array![[0.98]]),
            ..Default::default()
        };
        assert!(matches!(
            half_pair_without_map.into_source(),
            Err(LstError::MissingInput(_))
        ));
    }

    #[test]
    fn test_single_map_overrides_its_half_of_the_lookup() {
        let landcover = array![[10.0, 20.0]];
        let forest = LandCoverClass::Forest.emissivity().unwrap();
        let cropland = LandCoverClass::Cropland.emissivity().unwrap();

        let average_only = EmissivityInputs {
            landcover: Some(landcover.clone()),
            average_emissivity: Some(array![[0.98, 0.975]]),
            ..Default::default()
        };
        let source = average_only.into_source().unwrap();
        assert!(matches!(
            source,
            EmissivitySource::LandCoverWithOverride { average: Some(_), delta: None, .. }
        ));
        let resolver = EmissivityResolver::new(source);
        assert!(matches!(resolver.source(), EmissivitySource::LandCoverWithOverride { .. }));
        match resolver.resolve().unwrap() {
            ResolvedEmissivity::PerPixel { average, delta } => {
                assert_eq!(average.raster, array![[0.98, 0.975]]);
                assert!((delta.raster[[0, 0]] - cropland.delta()).abs() < 1e-12);
                assert!((delta.raster[[0, 1]] - forest.delta()).abs() < 1e-12);
            }
            other => panic!("expected per-pixel emissivity, got {:?}", other),
        }

        let delta_only = EmissivityInputs {
            landcover: Some(landcover),
            delta_emissivity: Some(array![[0.004, 0.005]]),
            ..Default::default()
        };
        match EmissivityResolver::new(delta_only.into_source().unwrap()).resolve().unwrap() {
            ResolvedEmissivity::PerPixel { average, delta } => {
                assert!((average.raster[[0, 0]] - cropland.average()).abs() < 1e-12);
                assert!((average.raster[[0, 1]] - forest.average()).abs() < 1e-12);
                assert_eq!(delta.raster, array![[0.004, 0.005]]);
            }
            other => panic!("expected per-pixel emissivity, got {:?}", other),
        }
    }

    #[test]
    fn test_override_shape_mismatch() {
        let resolver = EmissivityResolver::new(EmissivitySource::LandCoverWithOverride {
            landcover: array![[10.0, 20.0]],
            average: Some(array![[0.98]]),
            delta: None,
        });
        assert!(matches!(resolver.resolve(), Err(LstError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_explicit_shape_mismatch() {
        let resolver = EmissivityResolver::new(EmissivitySource::Explicit {
            average: array![[0.98, 0.98]],
            delta: array![[0.002]],
        });
        assert!(matches!(resolver.resolve(), Err(LstError::ShapeMismatch { .. })));
    }
}
