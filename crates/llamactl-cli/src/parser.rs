//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for supervising a local llama-server.
///
/// Run without a command to auto-start the last used profile, if it asks
/// for that.
#[derive(Parser)]
#[command(name = "llamactl")]
#[command(about = "Start, watch and stop a local llama-server")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Use this profile document instead of ~/.llamactl/profiles.json
    #[arg(long = "profiles", env = "LLAMACTL_PROFILES", global = true)]
    pub profiles: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
