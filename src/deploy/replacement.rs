// ABOUTME: Type-state replacement of a single primary replica.
// ABOUTME: Pending -> Vacated -> Started -> Verified, each transition consuming the previous state.

use super::error::DeployError;
use crate::health::{HealthCheckPolicy, HealthCheckPoller};
use crate::runtime::{ContainerConfig, ContainerOps};
use crate::types::ContainerId;
use std::time::Duration;

/// Replica slot chosen; the old container may still be running.
/// Available actions: `vacate()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pending;

/// Old container stopped and removed.
/// Available actions: `start()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Vacated;

/// New container running, health unknown.
/// Available actions: `verify()`
#[derive(Debug, Clone)]
pub struct Started {
    container: ContainerId,
}

/// New container answered its health check.
#[derive(Debug, Clone)]
pub struct Verified {
    container: ContainerId,
    attempt: u32,
}

/// A replica being replaced, parameterized by its current state.
#[derive(Debug)]
pub struct Replacement<S> {
    index: u32,
    name: String,
    state: S,
}

/// Result type for transitions that hand back the previous state on failure.
pub type TransitionResult<T, S> = Result<Replacement<T>, (Replacement<S>, DeployError)>;

impl<S> Replacement<S> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn transition<T>(self, state: T) -> Replacement<T> {
        Replacement {
            index: self.index,
            name: self.name,
            state,
        }
    }
}

impl Replacement<Pending> {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Replacement {
            index,
            name: name.into(),
            state: Pending,
        }
    }

    /// Stop and remove whatever holds the slot. An empty slot is fine.
    pub async fn vacate<R: ContainerOps>(
        self,
        runtime: &R,
        stop_timeout: Duration,
    ) -> Result<Replacement<Vacated>, DeployError> {
        let id = ContainerId::new(self.name.clone());

        if let Err(e) = runtime.stop_container(&id, stop_timeout).await
            && !e.is_absent()
        {
            return Err(DeployError::Rollout(format!("stopping {id}: {e}")));
        }
        if let Err(e) = runtime.remove_container(&id, true).await
            && !e.is_absent()
        {
            return Err(DeployError::Rollout(format!("removing {id}: {e}")));
        }

        Ok(self.transition(Vacated))
    }
}

impl Replacement<Vacated> {
    /// Create and start the new container.
    pub async fn start<R: ContainerOps>(
        self,
        runtime: &R,
        config: &ContainerConfig,
    ) -> Result<Replacement<Started>, DeployError> {
        let container = runtime
            .create_container(config)
            .await
            .map_err(|e| DeployError::Rollout(format!("creating {}: {e}", config.name)))?;

        if let Err(e) = runtime.start_container(&container).await {
            let _ = runtime.remove_container(&container, true).await;
            return Err(DeployError::Rollout(format!("starting {}: {e}", config.name)));
        }

        Ok(self.transition(Started { container }))
    }
}

impl Replacement<Started> {
    pub fn container(&self) -> &ContainerId {
        &self.state.container
    }

    /// Wait for warmup, then poll until healthy or the budget runs out.
    pub async fn verify(
        self,
        poller: &HealthCheckPoller<'_>,
        policy: &HealthCheckPolicy,
        warmup: Duration,
    ) -> TransitionResult<Verified, Started> {
        tokio::time::sleep(warmup).await;

        match poller.poll(policy).await {
            Ok(attempt) => {
                let container = self.state.container.clone();
                Ok(self.transition(Verified { container, attempt }))
            }
            Err(source) => {
                let context = format!("replica {} failed its health check", self.name);
                Err((self, DeployError::HealthCheckExhausted { context, source }))
            }
        }
    }
}

impl Replacement<Verified> {
    pub fn container(&self) -> &ContainerId {
        &self.state.container
    }

    /// Attempt number that passed.
    pub fn attempt(&self) -> u32 {
        self.state.attempt
    }
}
