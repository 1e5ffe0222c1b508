// ABOUTME: Runtime info trait for container runtimes.
// ABOUTME: Checks that the runtime daemon is reachable.

use super::sealed::Sealed;
use async_trait::async_trait;

/// Runtime connectivity.
#[async_trait]
pub trait RuntimeInfo: Sealed + Send + Sync {
    /// Ping the runtime to check connectivity.
    async fn ping(&self) -> Result<(), RuntimeInfoError>;
}

/// Errors from runtime info operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeInfoError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
