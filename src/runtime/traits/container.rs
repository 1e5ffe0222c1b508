// ABOUTME: Container operations trait for container runtimes.
// ABOUTME: Create, start, stop, remove, inspect, list and wait for containers.

use super::sealed::Sealed;
use super::shared_types::{ContainerConfig, ContainerInfo, ContainerState};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Label keys stamped on every container the orchestrator manages.
pub mod labels {
    pub const MANAGED: &str = "stagehand.managed";
    pub const STACK: &str = "stagehand.stack";
    pub const SERVICE: &str = "stagehand.service";
    pub const ROLE: &str = "stagehand.role";
    pub const REPLICA: &str = "stagehand.replica";
    pub const VERSION: &str = "stagehand.version";
}

/// Container lifecycle operations.
#[async_trait]
pub trait ContainerOps: Sealed + Send + Sync {
    /// Create a container from the given configuration.
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError>;

    /// Start a created container.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Stop a running container.
    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;

    /// Remove a container.
    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    /// Get detailed information about a container.
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError>;

    /// List containers matching the given filters.
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;

    /// Block until the container exits and return its exit code.
    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError>;
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Filter by label (key=value).
    pub labels: HashMap<String, String>,
    /// Filter by name (supports partial match).
    pub name: Option<String>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    /// All containers managed for a stack.
    pub fn for_stack(stack: &str, all: bool) -> Self {
        let mut labels = HashMap::new();
        labels.insert(labels::MANAGED.to_string(), "true".to_string());
        labels.insert(labels::STACK.to_string(), stack.to_string());
        Self {
            labels,
            name: None,
            all,
        }
    }

    /// Containers of one service within a stack.
    pub fn for_service(stack: &str, service: &str, all: bool) -> Self {
        let mut filters = Self::for_stack(stack, all);
        filters
            .labels
            .insert(labels::SERVICE.to_string(), service.to_string());
        filters
    }
}

/// Summary information about a container.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Container ID.
    pub id: ContainerId,
    /// Container name.
    pub name: String,
    /// Image used.
    pub image: String,
    /// Current state.
    pub state: ContainerState,
    /// Status message.
    pub status: String,
    /// Labels.
    pub labels: HashMap<String, String>,
}

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("container already running: {0}")]
    AlreadyRunning(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ContainerError {
    /// Whether the error only says the container is already gone.
    pub fn is_absent(&self) -> bool {
        matches!(self, ContainerError::NotFound(_) | ContainerError::NotRunning(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_filter_includes_stack_labels() {
        let filters = ContainerFilters::for_service("shop", "api", true);
        assert_eq!(filters.labels.get(labels::STACK), Some(&"shop".to_string()));
        assert_eq!(filters.labels.get(labels::SERVICE), Some(&"api".to_string()));
        assert_eq!(filters.labels.get(labels::MANAGED), Some(&"true".to_string()));
        assert!(filters.all);
    }

    #[test]
    fn absence_errors_are_recognised() {
        assert!(ContainerError::NotFound("x".into()).is_absent());
        assert!(ContainerError::NotRunning("x".into()).is_absent());
        assert!(!ContainerError::Runtime("x".into()).is_absent());
    }
}
