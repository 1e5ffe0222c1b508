// ABOUTME: Archive operations trait for container runtimes.
// ABOUTME: Copies files out of a container filesystem as a tar stream.

use super::sealed::Sealed;
use crate::types::ContainerId;
use async_trait::async_trait;

/// Filesystem archive operations on containers.
#[async_trait]
pub trait ArchiveOps: Sealed + Send + Sync {
    /// Copy a path out of a container. Returns the raw tar archive bytes.
    async fn copy_from_container(
        &self,
        container: &ContainerId,
        path: &str,
    ) -> Result<Vec<u8>, ArchiveError>;
}

/// Errors from archive operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("path not found in container: {0}")]
    PathNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
