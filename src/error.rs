use std::{io, path::Path, path::PathBuf};

/// Errors that abort a coverage run.
///
/// Problems with individual node rows or nodes never show up here: they are
/// routed to rejection lists and statistics instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read or write CSV")]
    Csv(#[from] csv::Error),
    #[error("failed to read or write JSON")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse the configuration")]
    Toml(#[from] toml::de::Error),
    #[error("GDAL error")]
    Gdal(#[from] gdal::errors::GdalError),
    #[error("invalid configuration: `{key}` {reason}")]
    Config { key: &'static str, reason: String },
    #[error("{path:?} is missing required node columns: {}", missing.join(", "))]
    MissingColumns {
        path: PathBuf,
        missing: Vec<&'static str>,
    },
    #[error("malformed node file {path:?}: {reason}")]
    MalformedNodes { path: PathBuf, reason: String },
    #[error("no valid nodes in {path:?} ({rows} row(s) read, all rejected)")]
    NoValidNodes { path: PathBuf, rows: usize },
    #[error("terrain raster not found at {0:?}")]
    TerrainNotFound(PathBuf),
    #[error("malformed raster {path:?}: {reason}")]
    Raster { path: PathBuf, reason: String },
    #[error("visibility primitive `{0}` is not available")]
    PrimitiveUnavailable(String),
    #[error(
        "visibility computation failed for node {node_id}: `{command}` exited with {status}\nstdout:\n{stdout}\nstderr:\n{stderr}"
    )]
    Viewshed {
        node_id: String,
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
    #[error("failed to build the viewshed worker pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("no visibility rasters to aggregate ({skipped} node(s) outside the terrain grid)")]
    NothingToAggregate { skipped: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps an `io::Error` to [`Error::Io`] for the given path.
pub(crate) fn io_at(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}
