//! apiop - installs the API Operator and wires up its image registry

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod error;
mod exit_codes;
mod orchestrator;
mod prompt;

use commands::install::ApiOperatorArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "apiop")]
#[command(version)]
#[command(about = "Installs the API Operator into a Kubernetes cluster", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Tool configuration file
    #[arg(long, global = true, env = "APIOP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a component into the cluster
    Install {
        #[command(subcommand)]
        target: InstallTarget,
    },
}

#[derive(Subcommand)]
enum InstallTarget {
    /// Install the API Operator and configure its image registry
    ApiOperator(ApiOperatorArgs),
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result: Result<(), CliError> = match cli.command {
        Commands::Install {
            target: InstallTarget::ApiOperator(args),
        } => commands::install::run(args, cli.config.as_deref()).await,
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
