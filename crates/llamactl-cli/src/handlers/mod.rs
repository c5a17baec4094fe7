//! Command handlers.
//!
//! Each handler opens the profile store itself, does its work and prints to
//! the terminal. Server output goes to stdout, status lines to stderr.

pub mod args;
pub mod profile;
pub mod start;

use std::path::Path;

use llamactl_core::{ProfileDocument, ProfileError, ProfileStore, ServerProfile};

use crate::commands::ProfileOverrides;
use crate::error::CliError;

/// Open the profile store at `path`, or at the default location.
pub fn open_store(path: Option<&Path>) -> Result<ProfileStore, CliError> {
    let store = match path {
        Some(path) => ProfileStore::open(path)?,
        None => ProfileStore::open_default()?,
    };
    Ok(store)
}

/// Pick the profile to launch: the named one, else the last used one, else
/// defaults. Returns the profile's name when it came from the store.
pub fn resolve_profile(
    document: &ProfileDocument,
    name: Option<&str>,
) -> Result<(Option<String>, ServerProfile), CliError> {
    if let Some(name) = name {
        let profile = document
            .get(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        return Ok((Some(name.to_string()), profile.clone()));
    }

    Ok(document.last_used().map_or_else(
        || (None, ServerProfile::default()),
        |(name, profile)| (Some(name.to_string()), profile.clone()),
    ))
}

/// Resolve a profile and apply command-line overrides on top of it.
pub fn resolve_with_overrides(
    document: &ProfileDocument,
    name: Option<&str>,
    overrides: &ProfileOverrides,
) -> Result<(Option<String>, ServerProfile), CliError> {
    let (name, mut profile) = resolve_profile(document, name)?;
    overrides.apply(&mut profile);
    Ok((name, profile))
}
