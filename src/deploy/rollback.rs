// ABOUTME: Restores the stack from the latest backup after a failed deployment.
// ABOUTME: Extracts the configuration archive, cycles the managed stack and re-checks health.

use super::backup::{BackupArtifact, BackupStore, extract_archive};
use super::error::DeployError;
use super::log::SessionLog;
use super::plan::{ROLE_PRIMARY, ROLE_SUPPORTING, ReleasePlan};
use super::replacement::Replacement;
use crate::config::{EnvFile, Manifest};
use crate::health::{HealthCheckPolicy, HealthCheckPoller, HttpProbe};
use crate::runtime::{ContainerFilters, ContainerOps, ContainerSummary, labels};
use crate::types::Version;

const STEP: &str = "rollback";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub backup_id: String,
    /// Version the primary was recreated at, when the backup recorded one.
    pub restored_version: Option<String>,
}

pub struct RollbackManager<'a, R: ContainerOps> {
    runtime: &'a R,
    probe: &'a dyn HttpProbe,
    plan: &'a ReleasePlan,
    log: &'a SessionLog,
}

fn role(container: &ContainerSummary) -> Option<&str> {
    container.labels.get(labels::ROLE).map(String::as_str)
}

impl<'a, R: ContainerOps> RollbackManager<'a, R> {
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

    pub async fn rollback(&self) -> Result<RollbackReport, DeployError> {
        let store = BackupStore::new(self.plan.manifest.backup_dir());
        let record = store
            .latest()
            .map_err(|e| DeployError::RollbackFailed(e.to_string()))?
            .ok_or_else(|| {
                DeployError::RollbackUnavailable(format!(
                    "no backup recorded in {}",
                    store.root().display()
                ))
            })?;

        if !record.has(BackupArtifact::ConfigArchive) {
            return Err(DeployError::RollbackFailed(format!(
                "backup {} has no configuration archive",
                record.id()
            )));
        }
        self.log.info(STEP, format!("restoring backup {}", record.id()));

        let archive = store.artifact_path(&record, BackupArtifact::ConfigArchive);
        let config_dir = self.plan.manifest.config_dir();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &config_dir))
            .await
            .map_err(|e| DeployError::RollbackFailed(e.to_string()))?
            .map_err(|e| {
                DeployError::RollbackFailed(format!("extracting configuration: {e}"))
            })?;
        self.log.info(STEP, "configuration restored");

        let previous = record
            .previous_version()
            .and_then(|v| Version::new(v).ok());
        let restored = self.reload(previous.clone());

        let stopped = self.stop_stack(&restored.manifest).await?;
        self.restart_primary(&restored, previous.as_ref()).await?;
        self.restart_supporting(&stopped).await;

        let policy = HealthCheckPolicy::verify(&restored.manifest.health);
        HealthCheckPoller::new(self.probe)
            .poll(&policy)
            .await
            .map_err(|e| DeployError::RollbackFailed(format!("restored stack unhealthy: {e}")))?;

        self.log.info(STEP, format!("rolled back to backup {}", record.id()));
        Ok(RollbackReport {
            backup_id: record.id().to_string(),
            restored_version: previous.map(|v| v.to_string()),
        })
    }

    /// Re-read the manifest and environment file after the configuration
    /// was restored. Falls back to the values the session started with.
    fn reload(&self, version: Option<Version>) -> ReleasePlan {
        let root = &self.plan.manifest.root;
        let environment = &self.plan.environment;

        let manifest = Manifest::discover(root)
            .and_then(|m| m.for_environment(environment))
            .unwrap_or_else(|e| {
                self.log
                    .warn(STEP, format!("keeping current manifest: {e}"));
                self.plan.manifest.clone()
            });

        let env = EnvFile::load(&EnvFile::path_for(root, environment)).unwrap_or_else(|e| {
            self.log
                .warn(STEP, format!("keeping current environment values: {e}"));
            self.plan.env.clone()
        });

        ReleasePlan::new(
            manifest,
            version.unwrap_or_else(|| self.plan.version.clone()),
            environment.clone(),
        )
        .with_env(env)
    }

    /// Stop every running managed container of the stack.
    async fn stop_stack(&self, manifest: &Manifest) -> Result<Vec<ContainerSummary>, DeployError> {
        let filters = ContainerFilters::for_stack(manifest.stack.as_str(), false);
        let running = self
            .runtime
            .list_containers(&filters)
            .await
            .map_err(|e| DeployError::RollbackFailed(e.to_string()))?;

        for container in &running {
            if let Err(e) = self
                .runtime
                .stop_container(&container.id, manifest.primary.stop.timeout)
                .await
                && !e.is_absent()
            {
                return Err(DeployError::RollbackFailed(format!(
                    "stopping {}: {e}",
                    container.name
                )));
            }
        }
        self.log
            .info(STEP, format!("stopped {} managed container(s)", running.len()));
        Ok(running)
    }

    /// Recreate replicas at the recorded version, or restart them in place
    /// when none was recorded.
    async fn restart_primary(
        &self,
        restored: &ReleasePlan,
        previous: Option<&Version>,
    ) -> Result<(), DeployError> {
        let manifest = &restored.manifest;

        let Some(version) = previous else {
            let filters = ContainerFilters::for_service(
                manifest.stack.as_str(),
                manifest.primary.name.as_str(),
                true,
            );
            let containers = self
                .runtime
                .list_containers(&filters)
                .await
                .map_err(|e| DeployError::RollbackFailed(e.to_string()))?;
            for container in containers.iter().filter(|c| role(c) == Some(ROLE_PRIMARY)) {
                self.runtime
                    .start_container(&container.id)
                    .await
                    .map_err(|e| {
                        DeployError::RollbackFailed(format!("starting {}: {e}", container.name))
                    })?;
            }
            self.log.info(STEP, "restarted primary in place");
            return Ok(());
        };

        for index in 1..=manifest.primary.replicas.max(1) {
            let config = restored
                .replica_config(index, version)
                .map_err(|e| DeployError::RollbackFailed(e.to_string()))?;
            Replacement::new(index, config.name.clone())
                .vacate(self.runtime, manifest.primary.stop.timeout)
                .await
                .map_err(|e| DeployError::RollbackFailed(e.to_string()))?
                .start(self.runtime, &config)
                .await
                .map_err(|e| DeployError::RollbackFailed(e.to_string()))?;
        }
        self.log
            .info(STEP, format!("primary recreated at {version}"));
        Ok(())
    }

    async fn restart_supporting(&self, stopped: &[ContainerSummary]) {
        for container in stopped.iter().filter(|c| role(c) == Some(ROLE_SUPPORTING)) {
            match self.runtime.start_container(&container.id).await {
                Ok(()) => self.log.info(STEP, format!("restarted {}", container.name)),
                Err(e) => self
                    .log
                    .warn(STEP, format!("{} did not restart: {e}", container.name)),
            }
        }
    }
}
