use clap::Args;

use dockhand::config;
use dockhand::deploy::{self, DeployReport};
use dockhand::image::ImageRef;

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Override the configured image tag for this run
    #[arg(long)]
    pub tag: Option<String>,

    /// Path to an alternate configuration file
    #[arg(long)]
    pub config: Option<String>,

    /// Skip following the service logs after apply
    #[arg(long)]
    pub no_follow: bool,
}

/// Deploy attaches to the remote log stream unless --no-follow is given, so
/// it runs in interactive pass-through mode by default.
pub fn is_interactive(args: &DeployArgs) -> bool {
    !args.no_follow
}

pub fn run(args: DeployArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DeployReport> {
    let config = config::load(args.config.as_deref())?;
    let image = ImageRef::from_config(&config.image, args.tag.as_deref())?;

    deploy::run(&config, &image, !args.no_follow)
}
