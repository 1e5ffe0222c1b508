// ABOUTME: Application-wide error types for stagehand.
// ABOUTME: Uses thiserror for ergonomic error handling.

use crate::config::ConfigError;
use crate::deploy::{DeployError, SessionFailed};
use crate::health::ProbeError;
use crate::runtime::{ContainerError, RuntimeError};
use crate::types::VersionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Session(#[from] SessionFailed),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] ProbeError),

    #[error("invalid version: {0}")]
    Version(#[from] VersionError),

    #[error("rollback cancelled by operator")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
