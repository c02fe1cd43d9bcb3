use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use super::{VisibilityPrimitive, VisibilityRequest};
use crate::error::{io_at, Error, Result};

/// Visibility computed by the `gdal_viewshed` tool.
///
/// Visible cells are written as 1, everything else (including out of range)
/// as 0, on the terrain's own grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GdalViewshed {
    executable: String,
}

impl Default for GdalViewshed {
    fn default() -> Self {
        Self::new("gdal_viewshed")
    }
}

impl GdalViewshed {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Full path of the tool, if it can be found.
    pub fn resolve(&self) -> Option<PathBuf> {
        let executable = Path::new(&self.executable);
        if executable.components().count() > 1 {
            return executable.is_file().then(|| executable.to_path_buf());
        }

        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(executable))
            .find(|candidate| candidate.is_file())
    }

    /// Command line arguments for a request, after the program name.
    pub fn arguments(request: &VisibilityRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-b".to_string(),
            "1".to_string(),
            "-ox".to_string(),
            request.observer_x.to_string(),
            "-oy".to_string(),
            request.observer_y.to_string(),
            "-oz".to_string(),
            request.observer_height_m.to_string(),
            "-tz".to_string(),
            request.target_height_m.to_string(),
            "-md".to_string(),
            request.max_distance_m.to_string(),
            "-vv".to_string(),
            "1".to_string(),
            "-iv".to_string(),
            "0".to_string(),
            "-ov".to_string(),
            "0".to_string(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        if let Some(coeff) = request.curvature_coeff {
            args.push("-cc".into());
            args.push(coeff.to_string().into());
        }

        args.push(request.terrain.clone().into_os_string());
        args.push(request.output.clone().into_os_string());
        args
    }
}

impl VisibilityPrimitive for GdalViewshed {
    fn check_available(&self) -> Result<()> {
        match self.resolve() {
            Some(path) => {
                log::debug!("using {:?}", path);
                Ok(())
            }
            None => Err(Error::PrimitiveUnavailable(self.executable.clone())),
        }
    }

    fn compute_visibility(&self, request: &VisibilityRequest) -> Result<()> {
        let program = self
            .resolve()
            .ok_or_else(|| Error::PrimitiveUnavailable(self.executable.clone()))?;
        let args = Self::arguments(request);

        let output = Command::new(&program)
            .args(&args)
            .output()
            .map_err(io_at(&program))?;

        if !output.status.success() {
            let command = std::iter::once(program.into_os_string())
                .chain(args)
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" ");
            return Err(Error::Viewshed {
                node_id: request.node_id.clone(),
                command,
                status: output.status.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(curvature: Option<f64>) -> VisibilityRequest {
        VisibilityRequest {
            node_id: "n1".into(),
            index: 0,
            terrain: PathBuf::from("dem.tif"),
            observer_x: 1000.5,
            observer_y: 2000.25,
            observer_height_m: 12.0,
            target_height_m: 1.5,
            max_distance_m: 20000.0,
            curvature_coeff: curvature,
            output: PathBuf::from("out/v.tif"),
        }
    }

    #[test]
    fn arguments_without_curvature() {
        let args: Vec<String> = GdalViewshed::arguments(&request(None))
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(
            args,
            [
                "-b", "1", "-ox", "1000.5", "-oy", "2000.25", "-oz", "12", "-tz", "1.5", "-md",
                "20000", "-vv", "1", "-iv", "0", "-ov", "0", "dem.tif", "out/v.tif"
            ]
        );
    }

    #[test]
    fn curvature_before_paths() {
        let args = GdalViewshed::arguments(&request(Some(0.13)));
        let n = args.len();
        assert_eq!(args[n - 4], "-cc");
        assert_eq!(args[n - 3], "0.13");
        assert_eq!(args[n - 2], "dem.tif");
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let primitive = GdalViewshed::new("definitely-not-a-viewshed-tool-3f9a");
        assert!(primitive.resolve().is_none());
        assert!(matches!(
            primitive.check_available(),
            Err(Error::PrimitiveUnavailable(name)) if name == "definitely-not-a-viewshed-tool-3f9a"
        ));
    }

    #[test]
    fn explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("viewshed");
        std::fs::write(&tool, b"").unwrap();
        assert_eq!(GdalViewshed::new(tool.to_string_lossy()).resolve(), Some(tool));
    }
}
