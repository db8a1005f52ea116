//! Single-band GeoTIFF input and output through GDAL.

use crate::types::{ensure_shape, is_no_data, GeoTransform, LstError, LstRaster, LstResult, NO_DATA};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// First band of a dataset with its georeferencing
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub data: LstRaster,
    pub geo_transform: GeoTransform,
    /// WKT of the source projection, empty when unknown
    pub projection: String,
}

/// Read band 1 as `f64`; the band's no-data value becomes NaN
pub fn read_band<P: AsRef<Path>>(path: P) -> LstResult<RasterBand> {
    log::info!("Reading raster: {}", path.as_ref().display());

    let dataset = Dataset::open(path.as_ref())?;
    let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let (width, height) = dataset.raster_size();

    let rasterband = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value();
    let buffer = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

    let mut data = Array2::from_shape_vec((height, width), buffer.data).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, format!("Failed to reshape band: {}", e))
    })?;
    if let Some(nodata) = nodata {
        data.mapv_inplace(|v| if v == nodata { NO_DATA } else { v });
    }

    log::debug!("Raster {}x{}, geotransform {:?}", height, width, geo_transform);
    Ok(RasterBand {
        data,
        geo_transform,
        projection: dataset.projection(),
    })
}

/// Inputs must share one pixel grid: same shape and same geotransform as the first band
pub fn ensure_same_grid(bands: &[&RasterBand]) -> LstResult<()> {
    let Some((reference, rest)) = bands.split_first() else {
        return Ok(());
    };
    for (index, band) in rest.iter().enumerate() {
        let name = format!("raster {}", index + 2);
        ensure_shape(&name, &band.data, reference.data.dim())?;
        if band.geo_transform != reference.geo_transform {
            return Err(LstError::ConflictingInputs(format!(
                "{} geotransform {:?} differs from {:?}",
                name, band.geo_transform, reference.geo_transform
            )));
        }
    }
    Ok(())
}

/// Write a Float64 GeoTIFF with NaN as no-data
pub fn write_band<P: AsRef<Path>>(
    path: P,
    data: &LstRaster,
    geo_transform: &GeoTransform,
    projection: Option<&str>,
) -> LstResult<()> {
    log::info!("Writing raster: {}", path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = data.dim();
    let mut dataset = driver.create_with_band_type::<f64, _>(path.as_ref(), width as isize, height as isize, 1)?;

    dataset.set_geo_transform(&geo_transform.to_gdal())?;
    if let Some(wkt) = projection.filter(|wkt| !wkt.is_empty()) {
        dataset.set_projection(wkt)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let flat: Vec<f64> = data.iter().map(|&v| if is_no_data(v) { NO_DATA } else { v }).collect();
    let buffer = Buffer::new((width, height), flat);
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(NO_DATA))?;

    Ok(())
}
