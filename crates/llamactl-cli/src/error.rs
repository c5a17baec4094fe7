//! CLI-specific error types and exit code mapping.

use llamactl_core::{ProfileError, SupervisorError};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad flags or an unusable launch configuration.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// Profile document could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server process could not be started or controlled.
    #[error("Process error: {0}")]
    Process(String),

    /// The server exited on its own.
    #[error(
        "Server crashed{}",
        .0.map(|code| format!(" with exit code {code}")).unwrap_or_default()
    )]
    ServerCrashed(Option<i32>),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow sysexits.h where one fits:
    /// - 1: Server crashed
    /// - 2: Invalid arguments (EX_USAGE)
    /// - 71: Process error (EX_OSERR)
    /// - 78: Configuration error (EX_CONFIG)
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::ServerCrashed(_) => 1,
            Self::Arguments(_) => 2,
            Self::Process(_) => 71,
            Self::Config(_) => 78,
        }
    }
}

impl From<SupervisorError> for CliError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Validation(e) => Self::Arguments(e.to_string()),
            other => Self::Process(other.to_string()),
        }
    }
}

impl From<ProfileError> for CliError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::NotFound(_) | ProfileError::EmptyName => Self::Arguments(err.to_string()),
            other => Self::Config(other.to_string()),
        }
    }
}
