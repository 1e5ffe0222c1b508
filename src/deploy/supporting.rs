// ABOUTME: Best-effort refresh of auxiliary services after the primary rollout.
// ABOUTME: Only services already running are refreshed; failures become warnings.

use super::instance::{InstanceRole, InstanceTable, ServiceInstance};
use super::log::SessionLog;
use super::plan::ReleasePlan;
use crate::config::SupportingConfig;
use crate::diagnostics::Warning;
use crate::runtime::{ContainerOps, ImageOps};
use crate::types::ContainerId;
use std::time::Duration;

const STEP: &str = "supporting";
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SupportingServiceUpdater<'a, R: ContainerOps + ImageOps> {
    runtime: &'a R,
    plan: &'a ReleasePlan,
    log: &'a SessionLog,
}

impl<'a, R: ContainerOps + ImageOps> SupportingServiceUpdater<'a, R> {
    pub fn new(runtime: &'a R, plan: &'a ReleasePlan, log: &'a SessionLog) -> Self {
        Self { runtime, plan, log }
    }

    /// Refresh each running supporting service. Never fails the session.
    pub async fn refresh(&self, instances: &mut InstanceTable) -> Vec<Warning> {
        let mut warnings = Vec::new();

        for service in &self.plan.manifest.supporting {
            let name = self.plan.manifest.supporting_name(&service.name);
            let id = ContainerId::new(name.clone());

            match self.runtime.inspect_container(&id).await {
                Ok(info) if info.state.is_running() => {}
                Ok(info) => {
                    self.log
                        .info(STEP, format!("{name} is {}, skipped", info.state));
                    continue;
                }
                Err(e) if e.is_absent() => {
                    self.log.info(STEP, format!("{name} not running, skipped"));
                    continue;
                }
                Err(e) => {
                    warnings.push(self.degraded(&name, &e.to_string()));
                    continue;
                }
            }

            match self.recreate(service, &id).await {
                Ok(()) => {
                    self.log
                        .info(STEP, format!("{name} refreshed with {}", service.image));
                    instances.upsert(ServiceInstance::new(
                        id,
                        service.name.as_str(),
                        InstanceRole::Supporting,
                    ));
                }
                Err(reason) => warnings.push(self.degraded(&name, &reason)),
            }
        }

        warnings
    }

    async fn recreate(
        &self,
        service: &SupportingConfig,
        id: &ContainerId,
    ) -> Result<(), String> {
        self.runtime
            .pull_image(&service.image)
            .await
            .map_err(|e| e.to_string())?;

        if let Err(e) = self.runtime.stop_container(id, STOP_TIMEOUT).await
            && !e.is_absent()
        {
            return Err(e.to_string());
        }
        if let Err(e) = self.runtime.remove_container(id, true).await
            && !e.is_absent()
        {
            return Err(e.to_string());
        }

        let config = self.plan.supporting_config(service);
        let new_id = self
            .runtime
            .create_container(&config)
            .await
            .map_err(|e| e.to_string())?;
        self.runtime
            .start_container(&new_id)
            .await
            .map_err(|e| e.to_string())
    }

    fn degraded(&self, name: &str, reason: &str) -> Warning {
        self.log
            .warn(STEP, format!("{name} refresh failed: {reason}"));
        Warning::dependency_degraded(format!("supporting service {name}: {reason}"))
    }
}
