//! Summing visibility rasters into a count raster.
//!
//! Every visibility raster is resampled onto one canonical grid before it is
//! added, by nearest neighbour: each canonical cell centre is taken into the
//! source CRS and looked up in the source grid. Rasters on exactly the
//! canonical grid skip the lookup. Any positive source value counts as one
//! observer seeing the cell. Masked cells count as zero, as do non-positive
//! values and centres outside the source extent or its projection's domain.

use std::{fs, path::Path};

use serde::Serialize;

use crate::{
    error::{io_at, Error, Result},
    grid::{Cell, GridSpec, Raster},
    raster::{read_grid_spec, read_raster, write_geotiff, CrsTransform},
};

/// No-data value of written coverage rasters.
pub const COVERAGE_NODATA: f64 = 0.0;

/// Number of observers seeing each cell of a grid.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageRaster {
    pub spec: GridSpec,
    pub counts: Vec<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CoverageSummary {
    pub max_count: u32,
    pub sum: u64,
    pub covered_pixels: usize,
}

impl CoverageRaster {
    pub fn summary(&self) -> CoverageSummary {
        self.counts.iter().fold(CoverageSummary::default(), |acc, &count| CoverageSummary {
            max_count: acc.max_count.max(count),
            sum: acc.sum + u64::from(count),
            covered_pixels: acc.covered_pixels + usize::from(count > 0),
        })
    }
}

/// Adds visibility rasters, one at a time, onto a canonical grid.
pub struct CoverageAccumulator {
    spec: GridSpec,
    counts: Vec<u32>,

    /// Cell centres of the canonical grid, row-major.
    centers: Vec<(f64, f64)>,
    added: usize,
}

impl CoverageAccumulator {
    pub fn new(spec: GridSpec) -> Self {
        let centers = (0..spec.height)
            .flat_map(|row| (0..spec.width).map(move |col| (row, col)))
            .map(|(row, col)| spec.cell_center(Cell { row, col }))
            .collect();
        Self {
            counts: vec![0; spec.len()],
            spec,
            centers,
            added: 0,
        }
    }

    /// Number of rasters added so far.
    pub fn added(&self) -> usize {
        self.added
    }

    /// Resamples one visibility raster onto the canonical grid and adds it.
    pub fn add(&mut self, visibility: &Raster) -> Result<()> {
        let source = visibility.spec();
        if *source == self.spec {
            for (count, cell) in self.counts.iter_mut().zip(visibility.values()) {
                if is_visible(*cell, visibility.nodata()) {
                    *count = count.saturating_add(1);
                }
            }
        } else {
            let projection = CrsTransform::between(self.spec.crs.as_deref(), source.crs.as_deref())?;
            let points: Vec<Option<(f64, f64)>> = if projection.is_identity() {
                self.centers.iter().copied().map(Some).collect()
            } else {
                projection.transform_points(&self.centers)
            };

            for (count, point) in self.counts.iter_mut().zip(points) {
                let visible = point
                    .and_then(|(x, y)| source.locate(x, y))
                    .and_then(|cell| visibility.value(cell))
                    .map_or(false, |value| value > 0.0);
                if visible {
                    *count = count.saturating_add(1);
                }
            }
        }

        self.added += 1;
        Ok(())
    }

    pub fn finish(self) -> CoverageRaster {
        CoverageRaster {
            spec: self.spec,
            counts: self.counts,
        }
    }
}

fn is_visible(value: f64, nodata: Option<f64>) -> bool {
    value > 0.0 && Some(value) != nodata
}

/// Sums in-memory visibility rasters onto `spec`.
///
/// An empty list has nothing to aggregate and is an error.
pub fn aggregate(rasters: &[Raster], spec: &GridSpec) -> Result<CoverageRaster> {
    if rasters.is_empty() {
        return Err(Error::NothingToAggregate { skipped: 0 });
    }
    let mut accumulator = CoverageAccumulator::new(spec.clone());
    for raster in rasters {
        accumulator.add(raster)?;
    }
    Ok(accumulator.finish())
}

/// Reads and sums visibility raster files onto `spec`, one file in memory
/// at a time.
pub fn merge_visibility_files<P: AsRef<Path>>(paths: &[P], spec: &GridSpec) -> Result<CoverageRaster> {
    if paths.is_empty() {
        return Err(Error::NothingToAggregate { skipped: 0 });
    }

    let mut accumulator = CoverageAccumulator::new(spec.clone());
    for path in paths {
        let path = path.as_ref();
        log::debug!("adding {:?}", path);
        accumulator.add(&read_raster(path)?)?;
    }

    let added = accumulator.added();
    let coverage = accumulator.finish();
    let summary = coverage.summary();
    log::info!(
        "merged {} visibility raster(s): max count {}, {} cell(s) covered",
        added,
        summary.max_count,
        summary.covered_pixels
    );
    Ok(coverage)
}

/// Canonical grid taken from an existing raster.
pub fn template_grid(path: &Path) -> Result<GridSpec> {
    read_grid_spec(path)
}

/// Writes a coverage raster as a `u32` GeoTIFF with no-data 0.
pub fn write_coverage(path: &Path, coverage: &CoverageRaster) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    write_geotiff(path, &coverage.spec, coverage.counts.clone(), Some(COVERAGE_NODATA))?;
    log::info!("coverage written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grid::{tests::unit_spec, GeoTransform},
        raster::tests::epsg_wkt,
    };

    fn raster(spec: &GridSpec, values: Vec<f64>) -> Raster {
        Raster::new(spec.clone(), values, None).unwrap()
    }

    fn three_of_2x2() -> (GridSpec, Vec<Raster>) {
        let spec = unit_spec(2, 2);
        let rasters = vec![
            raster(&spec, vec![1.0, 0.0, 1.0, 0.0]),
            raster(&spec, vec![1.0, 1.0, 0.0, 0.0]),
            raster(&spec, vec![1.0, 0.0, 0.0, 0.0]),
        ];
        (spec, rasters)
    }

    #[test]
    fn sums_aligned_rasters() {
        let (spec, rasters) = three_of_2x2();
        let coverage = aggregate(&rasters, &spec).unwrap();
        assert_eq!(coverage.counts, vec![3, 1, 1, 0]);
        assert_eq!(
            coverage.summary(),
            CoverageSummary {
                max_count: 3,
                sum: 5,
                covered_pixels: 3
            }
        );
    }

    #[test]
    fn order_does_not_matter() {
        let (spec, rasters) = three_of_2x2();
        let expected = aggregate(&rasters, &spec).unwrap();
        for order in [[0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
            let permuted: Vec<Raster> = order.iter().map(|&i| rasters[i].clone()).collect();
            assert_eq!(aggregate(&permuted, &spec).unwrap(), expected);
        }
    }

    #[test]
    fn positive_values_binarised() {
        let spec = unit_spec(3, 1);
        let rasters = vec![raster(&spec, vec![255.0, -1.0, 0.5]), raster(&spec, vec![f64::NAN, 2.0, 0.0])];
        let coverage = aggregate(&rasters, &spec).unwrap();
        assert_eq!(coverage.counts, vec![1, 1, 1]);
    }

    #[test]
    fn nodata_never_counts() {
        let spec = unit_spec(2, 1);
        let masked = Raster::new(spec.clone(), vec![9.0, 1.0], Some(9.0)).unwrap();
        assert_eq!(aggregate(&[masked], &spec).unwrap().counts, vec![0, 1]);
    }

    #[test]
    fn empty_input_is_an_error() {
        let spec = unit_spec(2, 2);
        assert!(matches!(
            aggregate(&[], &spec),
            Err(Error::NothingToAggregate { .. })
        ));
        assert!(matches!(
            merge_visibility_files::<&Path>(&[], &spec),
            Err(Error::NothingToAggregate { .. })
        ));
    }

    #[test]
    fn offset_raster_resampled() {
        // canonical: 4x1 cells from x=0 to 4; source: 2x1 cells from x=1 to 3
        let canonical = unit_spec(4, 1);
        let source = GridSpec {
            width: 2,
            height: 1,
            transform: GeoTransform::north_up(1.0, 1.0, 1.0, 1.0),
            crs: None,
        };
        let coverage = aggregate(&[raster(&source, vec![1.0, 1.0])], &canonical).unwrap();
        assert_eq!(coverage.counts, vec![0, 1, 1, 0]);
        assert_eq!(coverage.spec, canonical);
    }

    #[test]
    fn coarser_raster_nearest_neighbour() {
        // canonical: 4x4 unit cells; source: 2x2 cells of 2 units over the same extent
        let canonical = unit_spec(4, 4);
        let source = GridSpec {
            width: 2,
            height: 2,
            transform: GeoTransform::north_up(0.0, 4.0, 2.0, 2.0),
            crs: None,
        };
        let coverage = aggregate(&[raster(&source, vec![1.0, 0.0, 0.0, 1.0])], &canonical).unwrap();
        assert_eq!(
            coverage.counts,
            vec![
                1, 1, 0, 0, //
                1, 1, 0, 0, //
                0, 0, 1, 1, //
                0, 0, 1, 1,
            ]
        );
    }

    #[test]
    fn slightly_shifted_raster_not_added_raw() {
        // shifted by more than half a cell, so a raw add would be off by one
        let canonical = unit_spec(3, 1);
        let source = GridSpec {
            width: 3,
            height: 1,
            transform: GeoTransform::north_up(0.6, 1.0, 1.0, 1.0),
            crs: None,
        };
        let coverage = aggregate(&[raster(&source, vec![0.0, 1.0, 0.0])], &canonical).unwrap();
        assert_eq!(coverage.counts, vec![0, 0, 1]);
    }

    #[test]
    fn wgs84_raster_onto_utm_grid() {
        // 1 km cells around 15°E 50°N in zone 33N; the west column is at 14.986°E
        let canonical = GridSpec {
            width: 3,
            height: 3,
            transform: GeoTransform::north_up(498_500.0, 5_540_130.0, 1000.0, 1000.0),
            crs: Some(epsg_wkt(32633)),
        };
        let source = GridSpec {
            width: 1,
            height: 1,
            transform: GeoTransform::north_up(14.99, 50.1, 0.2, 0.2),
            crs: Some(epsg_wkt(4326)),
        };

        let mut accumulator = CoverageAccumulator::new(canonical.clone());
        accumulator.add(&raster(&source, vec![1.0])).unwrap();
        assert_eq!(accumulator.added(), 1);
        let coverage = accumulator.finish();
        assert_eq!(coverage.counts, vec![0, 1, 1, 0, 1, 1, 0, 1, 1]);
        assert_eq!(coverage.spec, canonical);
    }

    #[test]
    fn untransformable_centres_count_as_outside() {
        // the top row of centres sits on the pole, which Mercator cannot reach
        let canonical = GridSpec {
            width: 3,
            height: 3,
            transform: GeoTransform::north_up(-45.0, 105.0, 30.0, 30.0),
            crs: Some(epsg_wkt(4326)),
        };
        let source = GridSpec {
            width: 1,
            height: 1,
            transform: GeoTransform::north_up(-2.0e7, 2.0e7, 4.0e7, 4.0e7),
            crs: Some(epsg_wkt(3857)),
        };

        let coverage = aggregate(&[raster(&source, vec![1.0])], &canonical).unwrap();
        assert_eq!(coverage.counts, vec![0, 0, 0, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn files_merged_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let spec = unit_spec(2, 2);
        let paths: Vec<_> = [[1u8, 0, 1, 0], [1, 1, 0, 0]]
            .iter()
            .enumerate()
            .map(|(i, values)| {
                let path = dir.path().join(format!("v{}.tif", i));
                write_geotiff(&path, &spec, values.to_vec(), None).unwrap();
                path
            })
            .collect();

        let template = template_grid(&paths[0]).unwrap();
        let coverage = merge_visibility_files(&paths, &template).unwrap();
        assert_eq!(coverage.counts, vec![2, 1, 1, 0]);

        let out = dir.path().join("out").join("coverage.tif");
        write_coverage(&out, &coverage).unwrap();
        let written = read_raster(&out).unwrap();
        assert_eq!(written.values(), &[2.0, 1.0, 1.0, 0.0]);
        assert_eq!(written.nodata(), Some(COVERAGE_NODATA));
    }
}
