//! Profile command handlers.

use std::path::Path;

use anyhow::{Context, Result};
use llamactl_core::ServerProfile;

use super::open_store;
use crate::commands::{ProfileCommand, ProfileOverrides};
use crate::error::CliError;

/// Dispatch a profile subcommand.
pub fn execute(store_path: Option<&Path>, command: &ProfileCommand) -> Result<()> {
    match command {
        ProfileCommand::List => list(store_path),
        ProfileCommand::Show { name } => show(store_path, name),
        ProfileCommand::Save { name, overrides } => save(store_path, name, overrides),
        ProfileCommand::Delete { name } => delete(store_path, name),
        ProfileCommand::Use { name } => use_profile(store_path, name),
    }
}

fn list(store_path: Option<&Path>) -> Result<()> {
    let store = open_store(store_path)?;
    let document = store.document();

    if document.profiles.is_empty() {
        println!("No profiles saved in {}", store.path().display());
        return Ok(());
    }

    let last = document.last_used().map(|(name, _)| name);
    for name in document.names() {
        let marker = if Some(name) == last { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

fn show(store_path: Option<&Path>, name: &str) -> Result<()> {
    let store = open_store(store_path)?;
    let profile = store
        .document()
        .get(name)
        .ok_or_else(|| CliError::Arguments(format!("Profile '{name}' not found")))?;
    let json = serde_json::to_string_pretty(profile).context("Failed to render profile")?;
    println!("{json}");
    Ok(())
}

fn save(store_path: Option<&Path>, name: &str, overrides: &ProfileOverrides) -> Result<()> {
    let mut store = open_store(store_path)?;
    let mut profile = store
        .document()
        .get(name)
        .cloned()
        .unwrap_or_else(ServerProfile::default);
    overrides.apply(&mut profile);

    if let Err(e) = profile.to_launch_spec().validate() {
        eprintln!("warning: {e}");
    }

    store.upsert(name, profile).map_err(CliError::from)?;
    println!("Saved profile '{}' to {}", name.trim(), store.path().display());
    Ok(())
}

fn delete(store_path: Option<&Path>, name: &str) -> Result<()> {
    let mut store = open_store(store_path)?;
    store.remove(name).map_err(CliError::from)?;
    println!("Deleted profile '{name}'");
    Ok(())
}

fn use_profile(store_path: Option<&Path>, name: &str) -> Result<()> {
    let mut store = open_store(store_path)?;
    store.mark_used(name).map_err(CliError::from)?;
    println!("Using profile '{name}'");
    Ok(())
}
