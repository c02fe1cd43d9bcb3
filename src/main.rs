#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context;
use nodecover::{config::Config, pipeline};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "nodecover", about = "Line-of-sight coverage of fixed radio nodes")]
struct Opt {
    /// TOML configuration file, defaults apply when absent
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Computes the coverage raster of every node
    Compute,
    /// Validates the node file and prints row statistics
    Validate,
    /// Sums existing visibility rasters into a coverage raster
    Merge {
        /// Visibility rasters
        #[structopt(required = true, parse(from_os_str))]
        rasters: Vec<PathBuf>,

        /// Raster whose grid the coverage is computed on, the first input by default
        #[structopt(short, long, parse(from_os_str))]
        template: Option<PathBuf>,

        #[structopt(short, long, parse(from_os_str))]
        output: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading configuration from {:?}", path))
        }
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    match opt.command {
        Command::Compute => {
            let config = load_config(opt.config.as_ref())?;
            let summary = pipeline::compute_coverage(&config).context("coverage run failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Validate => {
            let config = load_config(opt.config.as_ref())?;
            let ingest = pipeline::validate_nodes(&config)
                .with_context(|| format!("validating {:?}", config.nodes.path))?;
            println!("{}", serde_json::to_string_pretty(&ingest.stats)?);
        }
        Command::Merge {
            rasters,
            template,
            output,
        } => {
            let summary = pipeline::merge(&rasters, template.as_deref(), &output)
                .context("merging visibility rasters failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
