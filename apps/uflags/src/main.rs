//! uflags binary.
//!
//! Runs the user-flag registry service or checks route scripts.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;
use uflags::cli::{self, CliResult};
use uflags::config::{Overrides, ServiceConfig};
use uflags::uflags_core::script::RouteKind;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "uflags", version)]
#[command(about = "Shared user-flag registry with a management endpoint")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate the registry and serve the management endpoint
    Serve {
        /// JSON config file
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Management endpoint address
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Initial value of the flag word (decimal)
        #[arg(long)]
        initial: Option<String>,

        /// Route script run once after the registry is allocated
        #[arg(long, value_name = "PATH")]
        startup_route: Option<PathBuf>,

        /// Bearer token for /mi (also read from UFLAGS_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Compile a route script and report fixup errors
    Check {
        /// Route script file
        path: PathBuf,

        /// Route kind the script belongs to
        #[arg(long, default_value = "request")]
        route: RouteKind,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(command: Command) -> CliResult {
    match command {
        Command::Serve {
            config,
            listen,
            initial,
            startup_route,
            api_key,
        } => {
            let overrides = Overrides {
                listen,
                initial,
                startup_route,
                api_key,
            };
            let config = ServiceConfig::load_or_default(config.as_deref())?
                .with_env()
                .apply_overrides(&overrides)?;
            cli::cmd_serve(config).await
        }
        Command::Check { path, route, json } => cli::cmd_check(&path, route, json),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(&args.log_level);

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "uflags failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
