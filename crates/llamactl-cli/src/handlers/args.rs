//! Args command handler.

use std::path::Path;

use anyhow::Result;
use llamactl_core::render_command_line;

use super::{open_store, resolve_with_overrides};
use crate::commands::ProfileOverrides;

/// Print the command line a `start` with the same flags would run.
///
/// Validation problems are reported as warnings; the line is printed anyway.
pub fn execute(
    store_path: Option<&Path>,
    profile: Option<&str>,
    overrides: &ProfileOverrides,
) -> Result<()> {
    let store = open_store(store_path)?;
    let (_, settings) = resolve_with_overrides(store.document(), profile, overrides)?;
    let spec = settings.to_launch_spec();

    if let Err(e) = spec.validate() {
        eprintln!("warning: {e}");
    }
    println!("{}", render_command_line(&spec));
    Ok(())
}
