//! GDAL-backed raster I/O and coordinate transformations.

use std::path::Path;

use gdal::{
    raster::Buffer,
    spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef},
    Dataset, DriverManager,
};

use crate::{
    error::{Error, Result},
    grid::{GeoTransform, GridSpec, Raster},
};

/// EPSG code of WGS84 geographic coordinates, the CRS of node positions.
pub const WGS84: u32 = 4326;

fn grid_spec(dataset: &Dataset) -> Result<GridSpec> {
    let (width, height) = dataset.raster_size();
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let crs = dataset
        .spatial_ref()
        .ok()
        .and_then(|srs| srs.to_wkt().ok())
        .filter(|wkt| !wkt.is_empty());
    Ok(GridSpec {
        width,
        height,
        transform,
        crs,
    })
}

/// Shape, georeference and CRS of a raster, without reading its values.
pub fn read_grid_spec(path: &Path) -> Result<GridSpec> {
    grid_spec(&Dataset::open(path)?)
}

/// Reads band 1 of a raster, with its georeference and no-data value.
pub fn read_raster(path: &Path) -> Result<Raster> {
    let dataset = Dataset::open(path)?;
    let spec = grid_spec(&dataset)?;
    let (width, height) = (spec.width, spec.height);

    let band = dataset.rasterband(1)?;
    let nodata = band.no_data_value();
    let buffer: Buffer<f64> = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

    log::debug!(
        "read {}x{} raster {:?} (nodata: {:?})",
        width,
        height,
        path,
        nodata
    );
    let values = buffer.data().to_vec();
    let reason = format!("{} values for a {}x{} grid", values.len(), width, height);
    Raster::new(spec, values, nodata).ok_or_else(|| Error::Raster {
        path: path.to_path_buf(),
        reason,
    })
}

/// Writes one band of values as a GeoTIFF on the given grid.
pub fn write_geotiff<T>(path: &Path, spec: &GridSpec, values: Vec<T>, nodata: Option<f64>) -> Result<()>
where
    T: gdal::raster::GdalType + Copy,
{
    if values.len() != spec.len() {
        return Err(Error::Raster {
            path: path.to_path_buf(),
            reason: format!(
                "{} values for a {}x{} grid",
                values.len(),
                spec.width,
                spec.height
            ),
        });
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<T, _>(path, spec.width, spec.height, 1)?;
    dataset.set_geo_transform(&spec.transform.to_gdal())?;
    if let Some(wkt) = &spec.crs {
        dataset.set_spatial_ref(&SpatialRef::from_wkt(wkt)?)?;
    }

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(nodata)?;
    let mut buffer = Buffer::new((spec.width, spec.height), values);
    band.write((0, 0), (spec.width, spec.height), &mut buffer)?;
    Ok(())
}

/// Point transformation between two coordinate reference systems.
///
/// The identity when both sides are the same CRS, or when either side has
/// no CRS at all (the data is then assumed to already share one).
pub struct CrsTransform {
    inner: Option<CoordTransform>,
}

impl CrsTransform {
    pub fn identity() -> Self {
        Self { inner: None }
    }

    /// Transformation from `source` to `target`, both given as WKT.
    pub fn between(source: Option<&str>, target: Option<&str>) -> Result<Self> {
        let (source, target) = match (source, target) {
            (Some(source), Some(target)) if source != target => (source, target),
            _ => return Ok(Self::identity()),
        };

        let source = gis_ordered(SpatialRef::from_wkt(source)?);
        let target = gis_ordered(SpatialRef::from_wkt(target)?);
        if source == target {
            return Ok(Self::identity());
        }
        Ok(Self {
            inner: Some(CoordTransform::new(&source, &target)?),
        })
    }

    /// Transformation from WGS84 longitude/latitude to `target`.
    pub fn from_wgs84(target: Option<&str>) -> Result<Self> {
        let target = match target {
            Some(target) => gis_ordered(SpatialRef::from_wkt(target)?),
            None => return Ok(Self::identity()),
        };
        let source = gis_ordered(SpatialRef::from_epsg(WGS84)?);
        if source == target {
            return Ok(Self::identity());
        }
        Ok(Self {
            inner: Some(CoordTransform::new(&source, &target)?),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.inner.is_none()
    }

    /// Transforms points in place.
    pub fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
        if let Some(inner) = &self.inner {
            let mut zs = vec![0.0; xs.len()];
            inner.transform_coords(xs, ys, &mut zs)?;
        }
        Ok(())
    }

    /// Transforms a single point.
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (mut xs, mut ys) = ([x], [y]);
        self.transform(&mut xs, &mut ys)?;
        Ok((xs[0], ys[0]))
    }

    /// Transforms many points, `None` for those that cannot be transformed.
    ///
    /// A failing batch is retried point by point, so one point outside the
    /// target projection's domain only loses itself.
    pub fn transform_points(&self, points: &[(f64, f64)]) -> Vec<Option<(f64, f64)>> {
        let (mut xs, mut ys): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
        let projected: Vec<Option<(f64, f64)>> = match self.transform(&mut xs, &mut ys) {
            Ok(()) => xs.into_iter().zip(ys).map(Some).collect(),
            Err(err) => {
                log::debug!(
                    "batch of {} point(s) failed ({}), retrying one by one",
                    points.len(),
                    err
                );
                points
                    .iter()
                    .map(|&(x, y)| self.transform_point(x, y).ok())
                    .collect()
            }
        };
        projected
            .into_iter()
            .map(|point| point.filter(|(x, y)| x.is_finite() && y.is_finite()))
            .collect()
    }
}

/// Longitude before latitude, whatever the CRS authority says.
fn gis_ordered(mut srs: SpatialRef) -> SpatialRef {
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    srs
}
