//! Launch parameters for a single llama-server run.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::args::tokenize_extra_args;

/// Default interface the server binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default context window in tokens.
pub const DEFAULT_CONTEXT_LENGTH: u32 = 2048;

/// Default number of layers offloaded to the GPU.
pub const DEFAULT_GPU_LAYERS: i32 = 33;

/// Default worker thread count.
pub const DEFAULT_THREAD_COUNT: u32 = 8;

/// Default prompt batch size.
pub const DEFAULT_BATCH_SIZE: u32 = 512;

pub const CONTEXT_LENGTH_RANGE: RangeInclusive<u32> = 128..=1_048_576;
pub const GPU_LAYERS_RANGE: RangeInclusive<i32> = -1..=999;
pub const THREAD_COUNT_RANGE: RangeInclusive<u32> = 1..=256;
pub const BATCH_SIZE_RANGE: RangeInclusive<u32> = 1..=2048;

/// Everything needed to launch one llama-server process.
///
/// A `LaunchSpec` is built by the caller for each start attempt and is not
/// modified once handed to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Path to the llama-server executable.
    pub binary_path: PathBuf,
    /// Path to the GGUF model file.
    pub model_path: PathBuf,
    /// Interface to bind (`--host`).
    pub host: String,
    /// Listening port (`--port`).
    pub port: u16,
    /// Context length in tokens (`-c`).
    pub context_length: u32,
    /// GPU layers to offload (`-ngl`), `-1` meaning all.
    pub gpu_layers: i32,
    /// Worker threads (`-t`).
    pub thread_count: u32,
    /// Prompt batch size (`-b`).
    pub batch_size: u32,
    /// Extra arguments appended verbatim after the fixed flags.
    pub extra_args: Vec<String>,
}

impl LaunchSpec {
    /// Create a spec with the given binary and model and default options.
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            context_length: DEFAULT_CONTEXT_LENGTH,
            gpu_layers: DEFAULT_GPU_LAYERS,
            thread_count: DEFAULT_THREAD_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            extra_args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn with_context_length(mut self, context_length: u32) -> Self {
        self.context_length = context_length;
        self
    }

    #[must_use]
    pub const fn with_gpu_layers(mut self, gpu_layers: i32) -> Self {
        self.gpu_layers = gpu_layers;
        self
    }

    #[must_use]
    pub const fn with_thread_count(mut self, thread_count: u32) -> Self {
        self.thread_count = thread_count;
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set extra arguments from a raw, whitespace-separated string.
    ///
    /// No shell quoting is honoured: `--foo "a b"` yields three tokens.
    #[must_use]
    pub fn with_extra_args(mut self, raw: &str) -> Self {
        self.extra_args = tokenize_extra_args(raw);
        self
    }

    /// Check every launch precondition, reporting the first one violated.
    ///
    /// Files are checked first, then numeric ranges, in field order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_file(&self.binary_path, FileRole::Binary)?;
        check_file(&self.model_path, FileRole::Model)?;

        if self.host.trim().is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort(self.port));
        }
        if !CONTEXT_LENGTH_RANGE.contains(&self.context_length) {
            return Err(ValidationError::InvalidContextLength(self.context_length));
        }
        if !GPU_LAYERS_RANGE.contains(&self.gpu_layers) {
            return Err(ValidationError::InvalidGpuLayers(self.gpu_layers));
        }
        if !THREAD_COUNT_RANGE.contains(&self.thread_count) {
            return Err(ValidationError::InvalidThreadCount(self.thread_count));
        }
        if !BATCH_SIZE_RANGE.contains(&self.batch_size) {
            return Err(ValidationError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }
}

#[derive(Clone, Copy)]
enum FileRole {
    Binary,
    Model,
}

fn check_file(path: &Path, role: FileRole) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(match role {
            FileRole::Binary => ValidationError::MissingBinaryPath,
            FileRole::Model => ValidationError::MissingModelPath,
        });
    }
    if !path.is_file() {
        return Err(match role {
            FileRole::Binary => ValidationError::BinaryNotFound(path.to_path_buf()),
            FileRole::Model => ValidationError::ModelNotFound(path.to_path_buf()),
        });
    }
    Ok(())
}

/// A launch precondition that does not hold.
///
/// The caller has to fix the input; retrying the same spec fails the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a server binary")]
    MissingBinaryPath,

    #[error("Server binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("Please select a model file")]
    MissingModelPath,

    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Host cannot be empty")]
    EmptyHost,

    #[error("Port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("Context length must be between 128 and 1,048,576, got {0}")]
    InvalidContextLength(u32),

    #[error("GPU layers must be between -1 and 999, got {0}")]
    InvalidGpuLayers(i32),

    #[error("Thread count must be between 1 and 256, got {0}")]
    InvalidThreadCount(u32),

    #[error("Batch size must be between 1 and 2048, got {0}")]
    InvalidBatchSize(u32),
}
