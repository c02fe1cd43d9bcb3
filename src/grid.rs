//! Georeferenced grids held in memory.
//!
//! Rasters are row-major, row 0 at the top as GDAL lays them out, and
//! georeferenced by a six-coefficient affine transform.

/// Affine transform from pixel space (column, row) to georeferenced (x, y).
///
/// The fields follow GDAL's geotransform coefficients in order:
///
/// _x = origin_x + col × pixel_width + row × row_rotation_
///
/// _y = origin_y + col × col_rotation + row × pixel_height_
///
/// For north-up rasters both rotations are zero and `pixel_height` is
/// negative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square-ish pixels.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            row_rotation: gt[2],
            origin_y: gt[3],
            col_rotation: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Georeferenced position of fractional pixel coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates (column, row) of a georeferenced position.
    ///
    /// `None` when the transform is singular.
    pub fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det == 0.0 || !det.is_finite() {
            return None;
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (self.pixel_width * dy - self.col_rotation * dx) / det;
        Some((col, row))
    }

    /// Finer of the two pixel dimensions, in CRS units.
    pub fn pixel_size(&self) -> f64 {
        self.pixel_width.abs().min(self.pixel_height.abs())
    }
}

/// A cell of a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

/// Shape, georeference and CRS of a grid, without its values.
#[derive(Clone, Debug, PartialEq)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,

    /// Coordinate reference system as WKT. `None` when the source has none.
    pub crs: Option<String>,
}

impl GridSpec {
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell containing a position in the grid CRS, if any.
    pub fn locate(&self, x: f64, y: f64) -> Option<Cell> {
        let (col, row) = self.transform.invert(x, y)?;
        let (col, row) = (col.floor(), row.floor());
        if !(col >= 0.0 && row >= 0.0) || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some(Cell {
            row: row as usize,
            col: col as usize,
        })
    }

    /// Position of the centre of a cell, in the grid CRS.
    pub fn cell_center(&self, cell: Cell) -> (f64, f64) {
        self.transform
            .apply(cell.col as f64 + 0.5, cell.row as f64 + 0.5)
    }

    /// Row-major offset of a cell.
    pub fn offset(&self, cell: Cell) -> usize {
        cell.row * self.width + cell.col
    }
}

/// A single band of values over a grid, with optional no-data masking.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    spec: GridSpec,
    values: Vec<f64>,
    nodata: Option<f64>,
}

impl Raster {
    /// Wraps row-major values. `None` when their count does not match the grid.
    pub fn new(spec: GridSpec, values: Vec<f64>, nodata: Option<f64>) -> Option<Self> {
        if values.len() != spec.len() {
            return None;
        }
        Some(Self {
            spec,
            values,
            nodata,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Value of a cell, `None` when it is masked (no-data or NaN).
    pub fn value(&self, cell: Cell) -> Option<f64> {
        if cell.row >= self.spec.height || cell.col >= self.spec.width {
            return None;
        }
        let value = self.values[self.spec.offset(cell)];
        if value.is_nan() || Some(value) == self.nodata {
            None
        } else {
            Some(value)
        }
    }

    /// Largest unmasked value in the square window of half-width `half`
    /// around `center`, clipped to the grid. `None` if nothing is unmasked.
    pub fn window_max(&self, center: Cell, half: usize) -> Option<f64> {
        let r0 = center.row.saturating_sub(half);
        let r1 = center.row.saturating_add(half).saturating_add(1).min(self.spec.height);
        let c0 = center.col.saturating_sub(half);
        let c1 = center.col.saturating_add(half).saturating_add(1).min(self.spec.width);

        let mut top: Option<f64> = None;
        for row in r0..r1 {
            for col in c0..c1 {
                if let Some(value) = self.value(Cell { row, col }) {
                    top = Some(top.map_or(value, |t| t.max(value)));
                }
            }
        }
        top
    }
}
