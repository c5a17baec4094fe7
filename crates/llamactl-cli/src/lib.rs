//! `llamactl` command-line front end.
//!
//! Resolves a launch profile, hands it to the runtime
//! [`Supervisor`](llamactl_runtime::Supervisor) and renders its events on the
//! terminal.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;

// Used by the binary only
use dotenvy as _;
use tracing_subscriber as _;

pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;

pub use commands::{Commands, ProfileCommand, ProfileOverrides};
pub use error::CliError;
pub use parser::Cli;
