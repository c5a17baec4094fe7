//! Named launch profiles persisted as a single JSON document.
//!
//! The document keeps every profile keyed by name plus a pointer to the one
//! used last:
//!
//! ```json
//! {
//!   "profiles": { "qwen-7b": { "binary_path": "...", "port": 8080, ... } },
//!   "last_profile": "qwen-7b"
//! }
//! ```
//!
//! The supervisor never reads this file; callers turn a profile into a
//! [`LaunchSpec`] and hand that over.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::launch::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONTEXT_LENGTH, DEFAULT_GPU_LAYERS, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_THREAD_COUNT, LaunchSpec,
};

/// Directory under the home directory holding llamactl state.
pub const CONFIG_DIR_NAME: &str = ".llamactl";

/// File name of the profile document.
pub const PROFILES_FILE_NAME: &str = "profiles.json";

/// Errors from loading or saving profiles.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Failed to access profile file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Profile file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Profile '{0}' not found")]
    NotFound(String),

    #[error("Profile name cannot be empty")]
    EmptyName,
}

/// One saved server configuration.
///
/// Missing fields fall back to the launch defaults, so hand-edited or older
/// documents keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerProfile {
    pub binary_path: String,
    pub model_path: String,
    pub host: String,
    pub port: u16,
    pub context: u32,
    pub ngl: i32,
    pub threads: u32,
    pub batch: u32,
    /// Raw extra arguments exactly as typed.
    pub additional_args: String,
    /// Start the server as soon as this profile is loaded.
    pub auto_start: bool,
}

impl Default for ServerProfile {
    fn default() -> Self {
        Self {
            binary_path: String::new(),
            model_path: String::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            context: DEFAULT_CONTEXT_LENGTH,
            ngl: DEFAULT_GPU_LAYERS,
            threads: DEFAULT_THREAD_COUNT,
            batch: DEFAULT_BATCH_SIZE,
            additional_args: String::new(),
            auto_start: false,
        }
    }
}

impl ServerProfile {
    /// Build the launch spec this profile describes. Not validated.
    pub fn to_launch_spec(&self) -> LaunchSpec {
        LaunchSpec::new(self.binary_path.trim(), self.model_path.trim())
            .with_host(self.host.trim())
            .with_port(self.port)
            .with_context_length(self.context)
            .with_gpu_layers(self.ngl)
            .with_thread_count(self.threads)
            .with_batch_size(self.batch)
            .with_extra_args(&self.additional_args)
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDocument {
    pub profiles: BTreeMap<String, ServerProfile>,
    pub last_profile: Option<String>,
}

impl ProfileDocument {
    /// Profile names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ServerProfile> {
        self.profiles.get(name)
    }

    /// The last used profile, if it still exists.
    pub fn last_used(&self) -> Option<(&str, &ServerProfile)> {
        let name = self.last_profile.as_deref()?;
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Insert or replace a profile and mark it as last used.
    pub fn upsert(&mut self, name: &str, profile: ServerProfile) -> Result<(), ProfileError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProfileError::EmptyName);
        }
        self.profiles.insert(name.to_string(), profile);
        self.last_profile = Some(name.to_string());
        Ok(())
    }

    /// Remove a profile, clearing the last-used pointer if it referenced it.
    pub fn remove(&mut self, name: &str) -> Result<ServerProfile, ProfileError> {
        let removed = self
            .profiles
            .remove(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        if self.last_profile.as_deref() == Some(name) {
            self.last_profile = None;
        }
        Ok(removed)
    }

    /// Mark an existing profile as last used.
    pub fn mark_used(&mut self, name: &str) -> Result<(), ProfileError> {
        if !self.profiles.contains_key(name) {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        self.last_profile = Some(name.to_string());
        Ok(())
    }
}

/// Default location of the profile document: `~/.llamactl/profiles.json`.
pub fn default_profiles_path() -> Result<PathBuf, ProfileError> {
    let home = dirs::home_dir().ok_or(ProfileError::NoHomeDir)?;
    Ok(home.join(CONFIG_DIR_NAME).join(PROFILES_FILE_NAME))
}

/// File-backed profile store.
///
/// Every mutating call writes the whole document back to disk.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    document: ProfileDocument,
}

impl ProfileStore {
    /// Open the store at `path`. A missing file yields an empty document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let path = path.into();
        let document = load_document(&path)?;
        debug!(
            path = %path.display(),
            profiles = document.profiles.len(),
            "Loaded profile document"
        );
        Ok(Self { path, document })
    }

    /// Open the store at [`default_profiles_path`].
    pub fn open_default() -> Result<Self, ProfileError> {
        Self::open(default_profiles_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn document(&self) -> &ProfileDocument {
        &self.document
    }

    pub fn upsert(&mut self, name: &str, profile: ServerProfile) -> Result<(), ProfileError> {
        self.document.upsert(name, profile)?;
        self.save()
    }

    pub fn remove(&mut self, name: &str) -> Result<ServerProfile, ProfileError> {
        let removed = self.document.remove(name)?;
        self.save()?;
        Ok(removed)
    }

    pub fn mark_used(&mut self, name: &str) -> Result<(), ProfileError> {
        self.document.mark_used(name)?;
        self.save()
    }

    /// Write the document to disk, creating the parent directory if needed.
    pub fn save(&self) -> Result<(), ProfileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ProfileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json =
            serde_json::to_string_pretty(&self.document).map_err(|source| ProfileError::Parse {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, json).map_err(|source| ProfileError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            path = %self.path.display(),
            profiles = self.document.profiles.len(),
            "Saved profile document"
        );
        Ok(())
    }
}

fn load_document(path: &Path) -> Result<ProfileDocument, ProfileError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ProfileDocument::default());
        }
        Err(source) => {
            return Err(ProfileError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&raw).map_err(|source| ProfileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
