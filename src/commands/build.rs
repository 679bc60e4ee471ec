use clap::Args;

use dockhand::build::{self, BuildReport};
use dockhand::config;
use dockhand::image::ImageRef;

use super::CmdResult;

#[derive(Args)]
pub struct BuildArgs {
    /// Override the configured image tag for this run
    #[arg(long)]
    pub tag: Option<String>,

    /// Path to an alternate configuration file
    #[arg(long)]
    pub config: Option<String>,
}

pub fn run(args: BuildArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<BuildReport> {
    let config = config::load(args.config.as_deref())?;
    let image = ImageRef::from_config(&config.image, args.tag.as_deref())?;

    build::run(&config, &image)
}
