use clap::{Parser, Subcommand};

use commands::GlobalArgs;

#[derive(Debug, Clone, Copy)]
enum ResponseMode {
    Json,
    InteractivePassthrough,
}

mod commands;
mod output;
mod tty;

use commands::{build, config, deploy};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "dockhand")]
#[command(version = VERSION)]
#[command(about = "CLI for building, publishing, and deploying containerized services")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, build the container image, and push it to the registry
    #[command(visible_alias = "init")]
    Build(build::BuildArgs),
    /// Pull the image remotely, upload the compose file, apply it, and follow logs
    Deploy(deploy::DeployArgs),
    /// Manage dockhand configuration
    Config(config::ConfigArgs),
}

fn response_mode(command: &Commands) -> ResponseMode {
    match command {
        Commands::Deploy(args) if deploy::is_interactive(args) => {
            ResponseMode::InteractivePassthrough
        }
        _ => ResponseMode::Json,
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let mode = response_mode(&cli.command);

    if let ResponseMode::InteractivePassthrough = mode {
        if !tty::require_tty_for_interactive() {
            let err = dockhand::Error::validation_invalid_argument(
                "tty",
                "This command requires an interactive TTY",
                None,
            )
            .with_hint("Pass --no-follow to deploy without attaching to logs");
            output::print_result::<serde_json::Value>(Err(err)).ok();
            return std::process::ExitCode::from(exit_code_to_u8(2));
        }
    }

    let (json_result, exit_code) = commands::run_json(cli.command, &global);

    match mode {
        ResponseMode::Json => {
            output::print_json_result(json_result).ok();
        }
        ResponseMode::InteractivePassthrough => {
            // Step output already went to the terminal; only surface errors.
            if let Err(err) = json_result {
                output::print_result::<serde_json::Value>(Err(err)).ok();
            }
        }
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
