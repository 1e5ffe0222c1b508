// ABOUTME: Replaces primary service instances with the new version.
// ABOUTME: Single-shot for one replica, sequential rolling for several; aborts on the first unhealthy replica.

use super::error::DeployError;
use super::instance::{HealthStatus, InstanceRole, InstanceTable, ServiceInstance};
use super::log::SessionLog;
use super::plan::{ROLE_PRIMARY, ReleasePlan};
use super::replacement::Replacement;
use super::strategy::RolloutMode;
use crate::health::{HealthCheckPolicy, HealthCheckPoller, HttpProbe};
use crate::runtime::{ContainerFilters, ContainerOps, labels};
use crate::types::ContainerId;

const STEP: &str = "rollout";

pub struct RolloutController<'a, R: ContainerOps> {
    runtime: &'a R,
    probe: &'a dyn HttpProbe,
    plan: &'a ReleasePlan,
    log: &'a SessionLog,
}

impl<'a, R: ContainerOps> RolloutController<'a, R> {
    pub fn new(
        runtime: &'a R,
        probe: &'a dyn HttpProbe,
        plan: &'a ReleasePlan,
        log: &'a SessionLog,
    ) -> Self {
        Self {
            runtime,
            probe,
            plan,
            log,
        }
    }

    pub async fn rollout(&self, instances: &mut InstanceTable) -> Result<RolloutMode, DeployError> {
        let manifest = &self.plan.manifest;
        let (mode, reason) = RolloutMode::for_manifest(manifest);
        match reason {
            Some(reason) => self.log.info(STEP, format!("single-shot rollout: {reason}")),
            None => self.log.info(
                STEP,
                format!("rolling rollout across {} replicas", mode.replicas()),
            ),
        }

        if mode == RolloutMode::SingleShot {
            self.stop_whole_service().await?;
        }

        let policy = HealthCheckPolicy::rollout(&manifest.health);
        let poller = HealthCheckPoller::new(self.probe);
        let total = mode.replicas();

        for index in 1..=total {
            let name = manifest.replica_name(index);
            let config = self.plan.replica_config(index, &self.plan.version)?;

            self.log.info(
                STEP,
                format!("replacing {name} ({index}/{total}) with {}", config.image),
            );

            let started = Replacement::new(index, name.clone())
                .vacate(self.runtime, manifest.primary.stop.timeout)
                .await?
                .start(self.runtime, &config)
                .await?;

            let instance = ServiceInstance::new(
                ContainerId::new(name.clone()),
                manifest.primary.name.as_str(),
                InstanceRole::Primary,
            )
            .with_version(self.plan.version.as_str());

            match started
                .verify(&poller, &policy, manifest.health.warmup)
                .await
            {
                Ok(verified) => {
                    self.log.info(
                        STEP,
                        format!(
                            "{name} healthy at attempt {}/{}",
                            verified.attempt(),
                            policy.max_attempts
                        ),
                    );
                    instances.upsert(marked(instance, HealthStatus::Healthy));
                }
                Err((_, e)) => {
                    self.log.error(STEP, format!("{e}; aborting rollout"));
                    instances.upsert(marked(instance, HealthStatus::Unhealthy));
                    return Err(e);
                }
            }

            if index < total {
                tokio::time::sleep(manifest.health.settle).await;
            }
        }

        Ok(mode)
    }

    /// Stop and remove every primary container except slot 1, which the
    /// replacement itself vacates.
    async fn stop_whole_service(&self) -> Result<(), DeployError> {
        let manifest = &self.plan.manifest;
        let filters = ContainerFilters::for_service(
            manifest.stack.as_str(),
            manifest.primary.name.as_str(),
            true,
        );
        let keep = manifest.replica_name(1);

        let containers = self
            .runtime
            .list_containers(&filters)
            .await
            .map_err(|e| DeployError::Rollout(e.to_string()))?;

        for container in containers.iter().filter(|c| {
            c.name != keep && c.labels.get(labels::ROLE).map(String::as_str) == Some(ROLE_PRIMARY)
        }) {
            let id = ContainerId::new(container.name.clone());
            Replacement::new(0, id.as_str())
                .vacate(self.runtime, manifest.primary.stop.timeout)
                .await?;
            self.log.info(STEP, format!("removed {id}"));
        }
        Ok(())
    }
}

fn marked(mut instance: ServiceInstance, health: HealthStatus) -> ServiceInstance {
    instance.mark(health);
    instance
}
