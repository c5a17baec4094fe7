//! Subcommands and shared profile override flags.

use clap::{Args, Subcommand};
use llamactl_core::ServerProfile;

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start llama-server and stream its output until it exits or Ctrl-C
    Start {
        /// Profile to start (defaults to the last used one)
        #[arg(short, long)]
        profile: Option<String>,
        #[command(flatten)]
        overrides: ProfileOverrides,
    },

    /// Print the llama-server command line without starting anything
    Args {
        /// Profile to render (defaults to the last used one)
        #[arg(short, long)]
        profile: Option<String>,
        #[command(flatten)]
        overrides: ProfileOverrides,
    },

    /// Manage saved profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

/// Profile management commands.
#[derive(Subcommand)]
pub enum ProfileCommand {
    /// List saved profiles (the last used one is marked with *)
    List,

    /// Show one profile as JSON
    Show {
        name: String,
    },

    /// Create or update a profile from flags
    Save {
        name: String,
        #[command(flatten)]
        overrides: ProfileOverrides,
    },

    /// Delete a profile
    Delete {
        name: String,
    },

    /// Make a profile the default for `start` and `args`
    Use {
        name: String,
    },
}

/// Flags that override individual profile fields.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOverrides {
    /// Path to the llama-server executable
    #[arg(long)]
    pub binary: Option<String>,

    /// Path to the model file
    #[arg(short, long)]
    pub model: Option<String>,

    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Context length in tokens
    #[arg(short = 'c', long = "ctx-size")]
    pub context: Option<u32>,

    /// Layers to offload to the GPU
    #[arg(long)]
    pub ngl: Option<i32>,

    /// CPU threads
    #[arg(short, long)]
    pub threads: Option<u32>,

    /// Batch size
    #[arg(short, long)]
    pub batch: Option<u32>,

    /// Extra llama-server arguments, split on whitespace
    #[arg(long, allow_hyphen_values = true)]
    pub extra_args: Option<String>,

    /// Start this profile when llamactl runs without a command
    #[arg(long, value_name = "BOOL")]
    pub auto_start: Option<bool>,
}

impl ProfileOverrides {
    /// Overwrite every field of `profile` that has a flag set.
    pub fn apply(&self, profile: &mut ServerProfile) {
        if let Some(binary) = &self.binary {
            profile.binary_path.clone_from(binary);
        }
        if let Some(model) = &self.model {
            profile.model_path.clone_from(model);
        }
        if let Some(host) = &self.host {
            profile.host.clone_from(host);
        }
        if let Some(port) = self.port {
            profile.port = port;
        }
        if let Some(context) = self.context {
            profile.context = context;
        }
        if let Some(ngl) = self.ngl {
            profile.ngl = ngl;
        }
        if let Some(threads) = self.threads {
            profile.threads = threads;
        }
        if let Some(batch) = self.batch {
            profile.batch = batch;
        }
        if let Some(extra_args) = &self.extra_args {
            profile.additional_args.clone_from(extra_args);
        }
        if let Some(auto_start) = self.auto_start {
            profile.auto_start = auto_start;
        }
    }
}
