use anyhow::{Context, Result};
use coco_export::config::Config;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
/// Export multi-label classifier scores over a COCO dataset
struct Args {
    #[structopt(long, default_value = "export.json5")]
    /// configuration file
    pub config_file: PathBuf,
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    // parse arguments
    let Args { config_file } = Args::from_args();
    let config = Config::open(&config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))?;

    // start the export pipeline
    coco_export::run(&config)?;

    Ok(())
}
