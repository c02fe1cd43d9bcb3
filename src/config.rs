//! Run configuration.
//!
//! Loaded from a TOML file where every section and key is optional; absent
//! values take the defaults below.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{io_at, Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub terrain: TerrainConfig,
    pub nodes: NodesConfig,
    pub height: HeightConfig,
    pub radio: RadioConfig,
    pub viewshed: ViewshedConfig,
    pub compute: ComputeConfig,
    pub output: OutputConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerrainConfig {
    /// Elevation raster as delivered.
    pub path: PathBuf,

    /// Elevation raster reprojected to the working grid, preferred when present.
    pub prepared_path: Option<PathBuf>,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/dem/dem.tif"),
            prepared_path: None,
        }
    }
}

impl TerrainConfig {
    /// The prepared raster if it exists on disk, the raw one otherwise.
    pub fn resolved_path(&self) -> &Path {
        match &self.prepared_path {
            Some(prepared) if prepared.exists() => prepared,
            _ => &self.path,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodesConfig {
    pub path: PathBuf,
    pub validation: ValidationConfig,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/nodes.csv"),
            validation: ValidationConfig::default(),
        }
    }
}

/// Toggles of the row validation pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub drop_invalid_coords: bool,
    pub drop_zero_coords: bool,
    pub dedupe_by_id: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            drop_invalid_coords: true,
            drop_zero_coords: true,
            dedupe_by_id: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightMode {
    /// Raise antennas over nearby terrain.
    AdaptiveMin,
    /// Use supplied heights, only bounded and Fresnel-adjusted.
    Fixed,
}

impl Default for HeightMode {
    fn default() -> Self {
        HeightMode::AdaptiveMin
    }
}

impl std::fmt::Display for HeightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeightMode::AdaptiveMin => write!(f, "adaptive_min"),
            HeightMode::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeightConfig {
    pub mode: HeightMode,

    /// Antenna height for nodes that carry none (metres).
    pub default_m: f64,
    pub min_m: f64,
    pub max_m: f64,

    /// Radius of terrain sampled around each node (metres).
    pub local_radius_m: f64,
    pub clearance_margin_m: f64,

    pub use_fresnel: bool,
    pub fresnel_clearance_ratio: f64,

    /// Where along the link the Fresnel zone is sampled, in (0, 1).
    pub fresnel_sample_ratio: f64,
}

impl Default for HeightConfig {
    fn default() -> Self {
        Self {
            mode: HeightMode::default(),
            default_m: 6.0,
            min_m: 4.0,
            max_m: 120.0,
            local_radius_m: 300.0,
            clearance_margin_m: 2.0,
            use_fresnel: true,
            fresnel_clearance_ratio: 0.6,
            fresnel_sample_ratio: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RadioConfig {
    pub frequency_mhz: f64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_mhz: 868.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewshedConfig {
    pub max_distance_m: f64,

    /// Height above ground at which coverage is evaluated.
    pub target_height_m: f64,
    pub curvature_correction: bool,
    pub refraction_coeff: f64,

    /// Name or path of the `gdal_viewshed` tool.
    pub executable: String,
}

impl Default for ViewshedConfig {
    fn default() -> Self {
        Self {
            max_distance_m: 20_000.0,
            target_height_m: 0.0,
            curvature_correction: true,
            refraction_coeff: 0.13,
            executable: String::from("gdal_viewshed"),
        }
    }
}

impl ViewshedConfig {
    /// Refraction coefficient to pass along, if curvature correction is on.
    pub fn curvature(&self) -> Option<f64> {
        if self.curvature_correction {
            Some(self.refraction_coeff)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComputeConfig {
    pub workers: usize,
    pub parallel: bool,

    /// Where per-node visibility rasters are written.
    pub tmp_dir: PathBuf,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            parallel: true,
            tmp_dir: PathBuf::from("tmp/viewsheds"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub coverage_tif: PathBuf,
    pub nodes_geojson: PathBuf,
    pub nodes_clean_csv: Option<PathBuf>,
    pub nodes_rejected_csv: Option<PathBuf>,
    pub nodes_stats_json: Option<PathBuf>,
    pub summary_json: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            coverage_tif: PathBuf::from("out/coverage.tif"),
            nodes_geojson: PathBuf::from("out/nodes.geojson"),
            nodes_clean_csv: None,
            nodes_rejected_csv: None,
            nodes_stats_json: None,
            summary_json: None,
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(io_at(path))?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        log::debug!("loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Checks value ranges that the type system does not.
    pub fn validate(&self) -> Result<()> {
        let height = &self.height;
        if height.min_m > height.max_m {
            return Err(invalid(
                "height.min_m",
                format!("({}) exceeds height.max_m ({})", height.min_m, height.max_m),
            ));
        }
        if !(height.fresnel_sample_ratio > 0.0 && height.fresnel_sample_ratio < 1.0) {
            return Err(invalid(
                "height.fresnel_sample_ratio",
                format!("must lie strictly between 0 and 1, got {}", height.fresnel_sample_ratio),
            ));
        }
        if !(height.fresnel_clearance_ratio >= 0.0) {
            return Err(invalid(
                "height.fresnel_clearance_ratio",
                format!("must not be negative, got {}", height.fresnel_clearance_ratio),
            ));
        }
        if !(height.local_radius_m >= 0.0) {
            return Err(invalid(
                "height.local_radius_m",
                format!("must not be negative, got {}", height.local_radius_m),
            ));
        }
        if !(self.viewshed.max_distance_m > 0.0) {
            return Err(invalid(
                "viewshed.max_distance_m",
                format!("must be positive, got {}", self.viewshed.max_distance_m),
            ));
        }
        if self.compute.workers == 0 {
            return Err(invalid("compute.workers", "must be at least 1".into()));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: String) -> Error {
    Error::Config { key, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_takes_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.height.mode, HeightMode::AdaptiveMin);
        assert_eq!(config.radio.frequency_mhz, 868.0);
        assert_eq!(config.viewshed.curvature(), Some(0.13));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [height]
            mode = "fixed"
            max_m = 60.0

            [nodes.validation]
            drop_zero_coords = false

            [viewshed]
            curvature_correction = false
            "#,
        )
        .unwrap();
        assert_eq!(config.height.mode, HeightMode::Fixed);
        assert_eq!(config.height.max_m, 60.0);
        assert_eq!(config.height.min_m, 4.0);
        assert!(!config.nodes.validation.drop_zero_coords);
        assert!(config.nodes.validation.dedupe_by_id);
        assert_eq!(config.viewshed.curvature(), None);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("[height]\nmax_height = 3.0\n").is_err());
    }

    #[test]
    fn inverted_height_band() {
        let mut config = Config::default();
        config.height.min_m = 50.0;
        config.height.max_m = 10.0;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key, "height.min_m"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sample_ratio_bounds() {
        let mut config = Config::default();
        config.height.fresnel_sample_ratio = 1.0;
        assert!(config.validate().is_err());
        config.height.fresnel_sample_ratio = 0.25;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers() {
        let mut config = Config::default();
        config.compute.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn prepared_terrain_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let prepared = dir.path().join("prepared.tif");
        let terrain = TerrainConfig {
            path: dir.path().join("raw.tif"),
            prepared_path: Some(prepared.clone()),
        };
        assert_eq!(terrain.resolved_path(), dir.path().join("raw.tif"));
        fs::write(&prepared, b"").unwrap();
        assert_eq!(terrain.resolved_path(), prepared);
    }
}
