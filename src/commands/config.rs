use clap::{Args, Subcommand};
use serde::Serialize;

use dockhand::config::{self, Config};

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show {
        /// Path to an alternate configuration file
        #[arg(long)]
        config: Option<String>,
    },
    /// Print the configuration file path
    Path {
        /// Path to an alternate configuration file
        #[arg(long)]
        config: Option<String>,
    },
    /// Write a starter configuration file
    Init {
        /// Path to an alternate configuration file
        #[arg(long)]
        config: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Merge a JSON spec into the stored configuration
    Set {
        /// JSON spec (positional)
        spec: Option<String>,
        /// Explicit JSON spec (takes precedence over positional)
        #[arg(long, value_name = "JSON")]
        json: Option<String>,
        /// Path to an alternate configuration file
        #[arg(long)]
        config: Option<String>,
    },
}

#[derive(Serialize)]
pub struct ConfigOutput {
    pub command: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_keys: Option<Vec<String>>,
}

pub fn run(args: ConfigArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { config } => show(config.as_deref()),
        ConfigCommand::Path { config } => path(config.as_deref()),
        ConfigCommand::Init { config, force } => init(config.as_deref(), force),
        ConfigCommand::Set { spec, json, config } => {
            let spec = json.or(spec).ok_or_else(|| {
                dockhand::Error::validation_invalid_argument(
                    "json",
                    "Provide a JSON spec positionally or via --json",
                    None,
                )
            })?;
            set(config.as_deref(), &spec)
        }
    }
}

fn show(config_override: Option<&str>) -> CmdResult<ConfigOutput> {
    let path = config::config_path(config_override)?;
    let config = config::load_unchecked(config_override)?;

    Ok((
        ConfigOutput {
            command: "config.show".to_string(),
            path: path.display().to_string(),
            config: Some(config),
            created: None,
            updated_keys: None,
        },
        0,
    ))
}

fn path(config_override: Option<&str>) -> CmdResult<ConfigOutput> {
    let path = config::config_path(config_override)?;

    Ok((
        ConfigOutput {
            command: "config.path".to_string(),
            path: path.display().to_string(),
            config: None,
            created: None,
            updated_keys: None,
        },
        0,
    ))
}

fn init(config_override: Option<&str>, force: bool) -> CmdResult<ConfigOutput> {
    let path = config::config_path(config_override)?;

    if path.exists() && !force {
        return Err(dockhand::Error::validation_invalid_argument(
            "config",
            "Configuration file already exists",
            Some(path.display().to_string()),
        )
        .with_hint("Pass --force to overwrite it"));
    }

    let config = Config::default();
    config::save_to(&path, &config)?;

    Ok((
        ConfigOutput {
            command: "config.init".to_string(),
            path: path.display().to_string(),
            config: Some(config),
            created: Some(true),
            updated_keys: None,
        },
        0,
    ))
}

fn set(config_override: Option<&str>, spec: &str) -> CmdResult<ConfigOutput> {
    let path = config::config_path(config_override)?;
    let (config, updated_keys) = config::merge_json(&path, spec)?;

    Ok((
        ConfigOutput {
            command: "config.set".to_string(),
            path: path.display().to_string(),
            config: Some(config),
            created: None,
            updated_keys: Some(updated_keys),
        },
        0,
    ))
}
