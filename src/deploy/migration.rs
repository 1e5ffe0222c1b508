// ABOUTME: Runs pending schema/data migrations in a one-off container of the new version.
// ABOUTME: Claims the pending marker before running; the container is always removed before returning.

use super::error::DeployError;
use super::log::SessionLog;
use super::plan::ReleasePlan;
use crate::runtime::{ContainerConfig, ContainerOps};
use crate::types::ContainerId;
use std::path::{Path, PathBuf};

const STEP: &str = "migrate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No marker, nothing ran. Also the outcome of any retry after a
    /// successful run, since a successful run consumes the marker.
    NotPending,
    Applied,
}

/// Marker names while a run is in flight and after it succeeded.
fn claimed(marker: &Path) -> PathBuf {
    with_suffix(marker, "running")
}

fn applied(marker: &Path) -> PathBuf {
    with_suffix(marker, "applied")
}

fn with_suffix(marker: &Path, suffix: &str) -> PathBuf {
    let mut name = marker.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

pub struct MigrationRunner<'a, R: ContainerOps> {
    runtime: &'a R,
}

impl<'a, R: ContainerOps> MigrationRunner<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Run pending migrations at most once across sessions.
    ///
    /// The marker is renamed to `<marker>.running` before the container
    /// starts. Success renames it to `<marker>.applied`; failure puts it back
    /// so the next attempt runs again. A run interrupted mid-flight leaves
    /// `<marker>.running` behind and is not retried automatically.
    pub async fn run(
        &self,
        plan: &ReleasePlan,
        log: &SessionLog,
    ) -> Result<MigrationOutcome, DeployError> {
        let Some(ref migrations) = plan.manifest.migrations else {
            return Ok(MigrationOutcome::NotPending);
        };

        let marker = plan.manifest.resolve(&migrations.marker);
        if !marker.exists() {
            log.info(STEP, format!("no pending migrations ({} absent)", marker.display()));
            return Ok(MigrationOutcome::NotPending);
        }

        let config = plan.migration_config(migrations.command.iter().cloned().collect())?;

        let in_flight = claimed(&marker);
        std::fs::rename(&marker, &in_flight).map_err(|e| {
            DeployError::Migration(format!("cannot claim {}: {e}", marker.display()))
        })?;

        log.info(
            STEP,
            format!("running migrations in {} ({})", config.name, config.image),
        );
        let result = self.run_container(&config, log).await;

        let (settled, outcome) = match result {
            Ok(0) => (applied(&marker), Ok(MigrationOutcome::Applied)),
            Ok(code) => (
                marker.clone(),
                Err(DeployError::Migration(format!(
                    "{} exited with code {code}",
                    config.name
                ))),
            ),
            Err(e) => (marker.clone(), Err(e)),
        };

        if let Err(e) = std::fs::rename(&in_flight, &settled) {
            log.warn(
                STEP,
                format!("cannot move {} to {}: {e}", in_flight.display(), settled.display()),
            );
        }
        if outcome.is_ok() {
            log.info(STEP, format!("migrations applied, marker moved to {}", settled.display()));
        }
        outcome
    }

    async fn run_container(
        &self,
        config: &ContainerConfig,
        log: &SessionLog,
    ) -> Result<i64, DeployError> {
        // A container left over from an interrupted run would block the name.
        let stale = ContainerId::new(config.name.clone());
        if let Err(e) = self.runtime.remove_container(&stale, true).await
            && !e.is_absent()
        {
            log.warn(STEP, format!("could not remove stale {stale}: {e}"));
        }

        let id = self
            .runtime
            .create_container(config)
            .await
            .map_err(|e| DeployError::Migration(e.to_string()))?;

        let result = self.start_and_wait(&id).await;

        if let Err(e) = self.runtime.remove_container(&id, true).await
            && !e.is_absent()
        {
            log.warn(STEP, format!("migration container {id} not removed: {e}"));
        }
        result
    }

    async fn start_and_wait(&self, id: &ContainerId) -> Result<i64, DeployError> {
        self.runtime
            .start_container(id)
            .await
            .map_err(|e| DeployError::Migration(e.to_string()))?;
        self.runtime
            .wait_container(id)
            .await
            .map_err(|e| DeployError::Migration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Manifest;
    use crate::runtime::fake::ScriptedRuntime;
    use crate::types::Version;

    fn plan(dir: &std::path::Path) -> ReleasePlan {
        let mut manifest = Manifest::from_yaml(
            r#"
stack: shop
primary:
  name: api
  image: ghcr.io/acme/api
migrations:
  command: ["./manage", "migrate"]
health:
  endpoint: http://localhost:8000/health
"#,
        )
        .unwrap();
        manifest.root = dir.to_path_buf();
        ReleasePlan::new(manifest, Version::new("v1.2.3").unwrap(), "production")
    }

    fn mark_pending(dir: &std::path::Path) {
        std::fs::create_dir_all(dir.join("migrations")).unwrap();
        std::fs::write(dir.join("migrations/pending"), "").unwrap();
    }

    #[tokio::test]
    async fn absent_marker_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = ScriptedRuntime::new();
        let log = SessionLog::in_memory();

        let outcome = MigrationRunner::new(&runtime)
            .run(&plan(dir.path()), &log)
            .await
            .unwrap();

        assert_eq!(outcome, MigrationOutcome::NotPending);
        assert!(runtime.calls_matching("create").is_empty());
    }

    #[tokio::test]
    async fn pending_marker_runs_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        mark_pending(dir.path());
        let runtime = ScriptedRuntime::new();
        let plan = plan(dir.path());
        let log = SessionLog::in_memory();
        let runner = MigrationRunner::new(&runtime);

        assert_eq!(runner.run(&plan, &log).await.unwrap(), MigrationOutcome::Applied);
        assert_eq!(runner.run(&plan, &log).await.unwrap(), MigrationOutcome::NotPending);

        assert_eq!(
            runtime.calls_matching("create"),
            vec!["create shop-migrate-v1.2.3 ghcr.io/acme/api:v1.2.3"]
        );
        assert!(!runtime.exists("shop-migrate-v1.2.3"));
        assert!(!dir.path().join("migrations/pending").exists());
        assert!(dir.path().join("migrations/pending.applied").exists());
    }

    #[tokio::test]
    async fn retried_session_does_not_run_applied_migrations_again() {
        let dir = tempfile::tempdir().unwrap();
        mark_pending(dir.path());
        let runtime = ScriptedRuntime::new();
        let log = SessionLog::in_memory();

        // Each session builds its own runner.
        for _ in 0..3 {
            MigrationRunner::new(&runtime)
                .run(&plan(dir.path()), &log)
                .await
                .unwrap();
        }
        assert_eq!(runtime.calls_matching("create").len(), 1);
    }

    #[tokio::test]
    async fn failing_migration_still_removes_its_container() {
        let dir = tempfile::tempdir().unwrap();
        mark_pending(dir.path());
        let runtime = ScriptedRuntime::new();
        runtime.set_wait_exit_code(3);
        let log = SessionLog::in_memory();

        let err = MigrationRunner::new(&runtime)
            .run(&plan(dir.path()), &log)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("exited with code 3"));
        assert!(!runtime.exists("shop-migrate-v1.2.3"));
        // Still pending, so the next attempt runs it again.
        assert!(dir.path().join("migrations/pending").exists());
        assert!(!dir.path().join("migrations/pending.running").exists());
    }

    #[tokio::test]
    async fn start_failure_still_removes_its_container() {
        let dir = tempfile::tempdir().unwrap();
        mark_pending(dir.path());
        let runtime = ScriptedRuntime::new();
        runtime.fail_start("shop-migrate-v1.2.3");
        let log = SessionLog::in_memory();

        let err = MigrationRunner::new(&runtime)
            .run(&plan(dir.path()), &log)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Migration(_)));
        assert!(!runtime.exists("shop-migrate-v1.2.3"));
    }
}
