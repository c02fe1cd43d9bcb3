//! Per-node visibility computations, run in parallel.
//!
//! Each in-grid node becomes one [`VisibilityRequest`], handed to a
//! [`VisibilityPrimitive`] which writes a visibility raster to a path of its
//! own. Requests share nothing but the read-only terrain file, so they run
//! on a bounded worker pool in any order; results are gathered back in node
//! order.

use std::{
    fs,
    path::{Path, PathBuf},
};

use rayon::prelude::*;

use crate::{
    config::Config,
    error::{io_at, Result},
    height::ResolvedObserver,
    terrain::Terrain,
};

mod command;

pub use command::GdalViewshed;

/// Everything the visibility primitive needs for one observer.
#[derive(Clone, Debug, PartialEq)]
pub struct VisibilityRequest {
    pub node_id: String,

    /// Position of the node in the validated node list.
    pub index: usize,

    /// Elevation raster, read-only.
    pub terrain: PathBuf,

    /// Observer position in the terrain CRS (centre of its cell).
    pub observer_x: f64,
    pub observer_y: f64,

    /// Antenna height above ground.
    pub observer_height_m: f64,

    /// Height above ground at which targets are seen.
    pub target_height_m: f64,
    pub max_distance_m: f64,

    /// Refraction coefficient for earth curvature correction, if enabled.
    pub curvature_coeff: Option<f64>,

    /// Where the visibility raster goes.
    pub output: PathBuf,
}

/// Computes the visibility raster of one observer.
///
/// Implementations must be safe to call from several threads at once, each
/// call writing only to its request's output path.
pub trait VisibilityPrimitive: Send + Sync {
    /// Fails early if the primitive cannot run at all.
    fn check_available(&self) -> Result<()>;

    /// Writes the visibility raster for `request` to `request.output`.
    fn compute_visibility(&self, request: &VisibilityRequest) -> Result<()>;
}

/// Request-independent parameters of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewshedSettings {
    pub target_height_m: f64,
    pub max_distance_m: f64,
    pub curvature_coeff: Option<f64>,
    pub tmp_dir: PathBuf,
}

impl ViewshedSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_height_m: config.viewshed.target_height_m,
            max_distance_m: config.viewshed.max_distance_m,
            curvature_coeff: config.viewshed.curvature(),
            tmp_dir: config.compute.tmp_dir.clone(),
        }
    }

    /// Output path of a node's visibility raster, distinct for every index.
    pub fn output_path(&self, index: usize, node_id: &str) -> PathBuf {
        let safe: String = node_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.tmp_dir
            .join(format!("viewshed_{:05}_{}.tif", index, safe))
    }
}

/// A visibility raster produced for a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeVisibility {
    pub node_id: String,
    pub index: usize,
    pub path: PathBuf,
}

/// Outcome of a batch: rasters of in-grid nodes, identifiers of the others.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewshedBatch {
    pub rasters: Vec<NodeVisibility>,
    pub skipped: Vec<String>,
}

/// Builds requests for in-grid observers; returns them with the
/// identifiers of observers outside the grid.
pub fn plan_requests(
    observers: &[ResolvedObserver],
    terrain: &Terrain,
    settings: &ViewshedSettings,
) -> (Vec<VisibilityRequest>, Vec<String>) {
    let mut requests = Vec::with_capacity(observers.len());
    let mut skipped = Vec::new();

    for (index, observer) in observers.iter().enumerate() {
        let position = match observer.position {
            Some(position) => position,
            None => {
                log::debug!("node {} is outside the terrain grid", observer.node.id);
                skipped.push(observer.node.id.clone());
                continue;
            }
        };

        let (observer_x, observer_y) = terrain.spec().cell_center(position.cell);
        requests.push(VisibilityRequest {
            node_id: observer.node.id.clone(),
            index,
            terrain: terrain.path().to_path_buf(),
            observer_x,
            observer_y,
            observer_height_m: observer.used_height_m,
            target_height_m: settings.target_height_m,
            max_distance_m: settings.max_distance_m,
            curvature_coeff: settings.curvature_coeff,
            output: settings.output_path(index, &observer.node.id),
        });
    }

    (requests, skipped)
}

/// Runs visibility requests on a bounded pool of worker threads.
///
/// The pool lives as long as the orchestrator; dropping it joins the workers.
pub struct Orchestrator<P> {
    primitive: P,
    pool: Option<rayon::ThreadPool>,
}

impl<P: VisibilityPrimitive> Orchestrator<P> {
    /// `workers <= 1` or `parallel == false` runs requests on the calling thread.
    pub fn new(primitive: P, workers: usize, parallel: bool) -> Result<Self> {
        let pool = if parallel && workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("viewshed-{}", i))
                    .build()?,
            )
        } else {
            None
        };
        Ok(Self { primitive, pool })
    }

    pub fn from_config(primitive: P, config: &Config) -> Result<Self> {
        Self::new(primitive, config.compute.workers, config.compute.parallel)
    }

    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(1, |pool| pool.current_num_threads())
    }

    /// Runs every request to completion and returns the rasters in request
    /// order. The first failure fails the whole batch.
    pub fn run(&self, requests: &[VisibilityRequest]) -> Result<Vec<NodeVisibility>> {
        let compute = |request: &VisibilityRequest| -> Result<NodeVisibility> {
            log::debug!(
                "viewshed for node {} at ({:.1}, {:.1}), {:.1} m",
                request.node_id,
                request.observer_x,
                request.observer_y,
                request.observer_height_m
            );
            self.primitive.compute_visibility(request)?;
            Ok(NodeVisibility {
                node_id: request.node_id.clone(),
                index: request.index,
                path: request.output.clone(),
            })
        };

        match &self.pool {
            Some(pool) => pool.install(|| requests.par_iter().map(compute).collect()),
            None => requests.iter().map(compute).collect(),
        }
    }

    /// Plans, checks and runs the visibility computations of all observers.
    pub fn compute(
        &self,
        observers: &[ResolvedObserver],
        terrain: &Terrain,
        settings: &ViewshedSettings,
    ) -> Result<ViewshedBatch> {
        let (requests, skipped) = plan_requests(observers, terrain, settings);
        if !skipped.is_empty() {
            log::warn!(
                "{} node(s) outside the terrain grid, skipped",
                skipped.len()
            );
        }

        if !requests.is_empty() {
            self.primitive.check_available()?;
            create_dir(&settings.tmp_dir)?;
        }

        log::info!(
            "computing {} viewshed(s) on {} worker(s)",
            requests.len(),
            self.workers()
        );
        let rasters = self.run(&requests)?;
        log::info!("{} viewshed(s) done", rasters.len());

        Ok(ViewshedBatch { rasters, skipped })
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(io_at(dir))
}
