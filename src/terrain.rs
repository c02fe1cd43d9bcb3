//! The elevation raster every node is resolved against.

use std::path::{Path, PathBuf};

use geo::Point;

use crate::{
    error::{Error, Result},
    grid::{Cell, GridSpec, Raster},
    raster::{read_raster, CrsTransform},
};

/// A node position projected onto the terrain grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPosition {
    /// Position in the terrain CRS.
    pub x: f64,
    pub y: f64,

    /// Containing cell.
    pub cell: Cell,
}

/// Read-only elevation raster, fully loaded, with the projection of
/// geographic positions into its CRS.
pub struct Terrain {
    path: PathBuf,
    elevation: Raster,
    projection: CrsTransform,
}

impl Terrain {
    /// Opens the elevation raster at `path`. A missing file is fatal.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::TerrainNotFound(path.to_path_buf()));
        }

        let elevation = read_raster(path)?;
        let terrain = Self::from_raster(path, elevation)?;
        log::info!(
            "terrain {:?}: {}x{} cells of {:.2} units",
            path,
            terrain.spec().width,
            terrain.spec().height,
            terrain.pixel_size()
        );
        Ok(terrain)
    }

    /// Wraps an elevation raster already in memory.
    ///
    /// Without a CRS, positions are taken as already being grid coordinates.
    pub fn from_raster(path: impl Into<PathBuf>, elevation: Raster) -> Result<Self> {
        let projection = CrsTransform::from_wgs84(elevation.spec().crs.as_deref())?;
        Ok(Self {
            path: path.into(),
            elevation,
            projection,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> &GridSpec {
        self.elevation.spec()
    }

    /// Finer of the two cell dimensions.
    pub fn pixel_size(&self) -> f64 {
        self.spec().transform.pixel_size()
    }

    /// Projects a longitude/latitude point and finds its cell.
    ///
    /// `None` when it falls outside the grid, or cannot be projected at all.
    pub fn locate(&self, position: Point<f64>) -> Option<GridPosition> {
        let (x, y) = match self.projection.transform_point(position.x(), position.y()) {
            Ok(projected) => projected,
            Err(err) => {
                log::warn!("cannot project {:?} onto the terrain: {}", position, err);
                return None;
            }
        };
        let cell = self.spec().locate(x, y)?;
        Some(GridPosition { x, y, cell })
    }

    /// Ground elevation of a cell, `None` when masked.
    pub fn elevation(&self, cell: Cell) -> Option<f64> {
        self.elevation.value(cell)
    }

    /// Highest unmasked elevation within `half` cells of `cell`.
    pub fn window_max(&self, cell: Cell, half: usize) -> Option<f64> {
        self.elevation.window_max(cell, half)
    }
}
