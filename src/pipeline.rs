//! End-to-end runs: from node file and terrain to coverage raster.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{
    config::Config,
    coverage::{merge_visibility_files, template_grid, write_coverage, CoverageSummary},
    error::{Error, Result},
    export::{write_clean_csv, write_json, write_nodes_geojson, write_rejected_csv, NodeStats},
    height::HeightResolver,
    nodes::{ingest, Ingest},
    terrain::Terrain,
    viewshed::{GdalViewshed, Orchestrator, ViewshedSettings, VisibilityPrimitive},
};

/// What a coverage run produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub nodes: usize,
    pub nodes_skipped_outside_dem: usize,
    pub node_input_stats: NodeStats,
    pub viewshed_rasters: usize,
    pub coverage_tif: PathBuf,
    pub nodes_geojson: PathBuf,
    #[serde(flatten)]
    pub coverage: CoverageSummary,
}

/// Runs a full coverage computation with `gdal_viewshed`.
pub fn compute_coverage(config: &Config) -> Result<RunSummary> {
    let primitive = GdalViewshed::new(config.viewshed.executable.clone());
    compute_coverage_with(config, primitive)
}

/// Runs a full coverage computation with the given visibility primitive.
pub fn compute_coverage_with<P: VisibilityPrimitive>(
    config: &Config,
    primitive: P,
) -> Result<RunSummary> {
    let terrain = Terrain::open(config.terrain.resolved_path())?;

    let ingest = validate_nodes(config)?;
    if ingest.nodes.is_empty() {
        return Err(Error::NoValidNodes {
            path: config.nodes.path.clone(),
            rows: ingest.stats.rows_input,
        });
    }

    let (observers, height_stats) =
        HeightResolver::from_config(config).resolve_all(&ingest.nodes, &terrain);
    let node_stats = NodeStats {
        ingest: ingest.stats,
        height: height_stats,
    };
    if let Some(path) = &config.output.nodes_clean_csv {
        write_clean_csv(path, &observers)?;
    }
    if let Some(path) = &config.output.nodes_stats_json {
        write_json(path, &node_stats)?;
    }

    let batch = {
        let orchestrator = Orchestrator::from_config(primitive, config)?;
        orchestrator.compute(&observers, &terrain, &ViewshedSettings::from_config(config))?
    };
    if batch.rasters.is_empty() {
        return Err(Error::NothingToAggregate {
            skipped: batch.skipped.len(),
        });
    }

    let paths: Vec<&Path> = batch.rasters.iter().map(|r| r.path.as_path()).collect();
    let coverage = merge_visibility_files(&paths, terrain.spec())?;
    write_coverage(&config.output.coverage_tif, &coverage)?;
    write_nodes_geojson(&config.output.nodes_geojson, &observers)?;

    let summary = RunSummary {
        nodes: observers.len(),
        nodes_skipped_outside_dem: batch.skipped.len(),
        node_input_stats: node_stats,
        viewshed_rasters: batch.rasters.len(),
        coverage_tif: config.output.coverage_tif.clone(),
        nodes_geojson: config.output.nodes_geojson.clone(),
        coverage: coverage.summary(),
    };
    if let Some(path) = &config.output.summary_json {
        write_json(path, &summary)?;
    }
    Ok(summary)
}

/// Ingests the configured node file, writing rejected rows if configured.
pub fn validate_nodes(config: &Config) -> Result<Ingest> {
    let ingest = ingest(&config.nodes.path, &config.nodes.validation)?;
    if let Some(path) = &config.output.nodes_rejected_csv {
        write_rejected_csv(path, &ingest.rejected)?;
    }
    Ok(ingest)
}

/// Sums existing visibility rasters onto the grid of `template`, or of the
/// first raster when there is none.
pub fn merge<P: AsRef<Path>>(
    rasters: &[P],
    template: Option<&Path>,
    output: &Path,
) -> Result<CoverageSummary> {
    let template = match (template, rasters.first()) {
        (Some(template), _) => template,
        (None, Some(first)) => first.as_ref(),
        (None, None) => return Err(Error::NothingToAggregate { skipped: 0 }),
    };
    let coverage = merge_visibility_files(rasters, &template_grid(template)?)?;
    write_coverage(output, &coverage)?;
    Ok(coverage.summary())
}
