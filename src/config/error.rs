// ABOUTME: Error types for manifest and environment file loading.
// ABOUTME: Distinguishes missing files from parse and validation failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("manifest not found in {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid manifest: {0}")]
    Invalid(String),

    #[error("environment file not found: {0}")]
    EnvFileMissing(PathBuf),

    #[error("failed to parse environment file {path}: {message}")]
    EnvFile { path: PathBuf, message: String },

    #[error("missing required environment key: {0}")]
    MissingKey(String),
}
