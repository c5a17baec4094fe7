//! CLI entry point.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use llamactl_cli::{Cli, CliError, Commands, handlers};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}

/// Logs go to stderr so stdout carries only server output.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let store_path = cli.profiles.as_deref();

    let Some(command) = cli.command else {
        return auto_start(store_path).await;
    };

    match command {
        Commands::Start { profile, overrides } => {
            handlers::start::execute(store_path, profile.as_deref(), &overrides).await?;
        }
        Commands::Args { profile, overrides } => {
            handlers::args::execute(store_path, profile.as_deref(), &overrides)?;
        }
        Commands::Profile { command } => {
            handlers::profile::execute(store_path, &command)?;
        }
    }

    Ok(())
}

/// Start the last used profile if it is marked for auto-start, otherwise
/// show help.
async fn auto_start(store_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let store = handlers::open_store(store_path)?;
    if let Some((name, profile)) = store.document().last_used() {
        if profile.auto_start {
            eprintln!("Auto-starting profile: {name}");
            return handlers::start::run(&profile.to_launch_spec()).await;
        }
    }

    Cli::command().print_help()?;
    Ok(())
}
