// ABOUTME: Deployment session coordinator: runs the ordered steps and owns the session state.
// ABOUTME: Short-circuits on the first fatal step, notifies, and offers an operator-gated rollback.

use super::approval::ApprovalGate;
use super::backup::{BackupManager, BackupRecord};
use super::error::{DeployError, PreflightCheck};
use super::instance::{InstanceTable, ServiceInstance};
use super::log::SessionLog;
use super::migration::{MigrationOutcome, MigrationRunner};
use super::plan::ReleasePlan;
use super::preflight::{HostInspector, PreflightValidator};
use super::provision::ImageProvisioner;
use super::rollback::RollbackManager;
use super::rollout::RolloutController;
use super::state::SessionState;
use super::step::{Step, StepOutcome};
use super::supporting::SupportingServiceUpdater;
use super::verify::VerificationSuite;
use crate::config::{ConfigError, EnvFile};
use crate::diagnostics::{Diagnostics, Warning};
use crate::health::HttpProbe;
use crate::notify::{NotificationDispatcher, NotificationStatus};
use crate::runtime::{ContainerFilters, Runtime};
use crate::types::ContainerId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;

const SESSION: &str = "session";

/// What happened after a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The session succeeded, or failed before anything changed.
    NotOffered,
    Declined,
    Restored {
        backup_id: String,
        version: Option<String>,
    },
    Failed {
        reason: String,
    },
}

/// Final snapshot of a session, printed to the operator and appended to the log.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub version: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: SessionState,
    pub warnings: Vec<Warning>,
    pub instances: Vec<ServiceInstance>,
    pub backup: Option<String>,
    pub rollback: RollbackOutcome,
    pub log_path: Option<PathBuf>,
}

impl SessionSummary {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let elapsed = (self.finished_at - self.started_at).num_seconds();

        let _ = writeln!(out, "Deployment summary");
        let _ = writeln!(out, "  version:     {}", self.version);
        let _ = writeln!(out, "  environment: {}", self.environment);
        let _ = writeln!(
            out,
            "  started:     {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            out,
            "  finished:    {} ({elapsed}s)",
            self.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(out, "  state:       {}", self.state);
        if let Some(ref backup) = self.backup {
            let _ = writeln!(out, "  backup:      {backup}");
        }
        match &self.rollback {
            RollbackOutcome::NotOffered => {}
            RollbackOutcome::Declined => {
                let _ = writeln!(out, "  rollback:    declined");
            }
            RollbackOutcome::Restored { backup_id, version } => {
                let _ = writeln!(
                    out,
                    "  rollback:    restored {backup_id} ({})",
                    version.as_deref().unwrap_or("version unknown")
                );
            }
            RollbackOutcome::Failed { reason } => {
                let _ = writeln!(out, "  rollback:    failed: {reason}");
            }
        }

        if !self.instances.is_empty() {
            let _ = writeln!(out, "  services:");
            for instance in &self.instances {
                let _ = writeln!(
                    out,
                    "    {:<24} {:<12} {:<10} {}",
                    instance.id.as_str(),
                    instance.service,
                    instance.health.to_string(),
                    instance.version.as_deref().unwrap_or("-")
                );
            }
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out, "  warnings:");
            for warning in &self.warnings {
                let _ = writeln!(out, "    - {}", warning.message);
            }
        }

        if let Some(ref path) = self.log_path {
            let _ = writeln!(out, "  log:         {}", path.display());
        }
        out
    }
}

/// A session that ended in failure, with everything known at that point.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SessionFailed {
    pub error: DeployError,
    pub summary: Box<SessionSummary>,
}

/// One deployment of one version to one environment.
pub struct DeploymentSession<'a, R: Runtime> {
    plan: ReleasePlan,
    /// The connected runtime, or why connecting failed. A failed connection
    /// is reported by preflight, so later steps never see it.
    runtime: Result<&'a R, String>,
    probe: &'a dyn HttpProbe,
    host: &'a dyn HostInspector,
    approval: &'a dyn ApprovalGate,
    notifier: Option<NotificationDispatcher>,
    log: SessionLog,
    diagnostics: Diagnostics,
    instances: InstanceTable,
    state: SessionState,
    started_at: DateTime<Utc>,
    backup: Option<BackupRecord>,
}

impl<'a, R: Runtime> DeploymentSession<'a, R> {
    pub fn new(
        plan: ReleasePlan,
        runtime: &'a R,
        probe: &'a dyn HttpProbe,
        host: &'a dyn HostInspector,
        approval: &'a dyn ApprovalGate,
    ) -> Self {
        Self::with_connection(plan, Ok(runtime), probe, host, approval)
    }

    /// A session on a host whose runtime could not be reached. It runs
    /// preflight, which fails naming the runtime and any other failed check,
    /// then logs and notifies like any other failed session.
    pub fn unreachable(
        plan: ReleasePlan,
        reason: impl Into<String>,
        probe: &'a dyn HttpProbe,
        host: &'a dyn HostInspector,
        approval: &'a dyn ApprovalGate,
    ) -> Self {
        Self::with_connection(plan, Err(reason.into()), probe, host, approval)
    }

    fn with_connection(
        plan: ReleasePlan,
        runtime: Result<&'a R, String>,
        probe: &'a dyn HttpProbe,
        host: &'a dyn HostInspector,
        approval: &'a dyn ApprovalGate,
    ) -> Self {
        let started_at = Utc::now();
        let log = SessionLog::open(&plan.manifest.log_dir(), started_at);
        Self {
            plan,
            runtime,
            probe,
            host,
            approval,
            notifier: None,
            log,
            diagnostics: Diagnostics::default(),
            instances: InstanceTable::default(),
            state: SessionState::Initializing,
            started_at,
            backup: None,
        }
    }

    /// Use these channels instead of the ones named by the environment file.
    pub fn with_notifier(mut self, notifier: NotificationDispatcher) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub async fn run(mut self) -> Result<SessionSummary, SessionFailed> {
        let env = EnvFile::load(&EnvFile::path_for(
            &self.plan.manifest.root,
            &self.plan.environment,
        ));
        let notifier = match (self.notifier.take(), &env) {
            (Some(notifier), _) => notifier,
            (None, Ok(env)) => {
                NotificationDispatcher::from_env(&self.plan.manifest.notifications, env)
            }
            (None, Err(_)) => NotificationDispatcher::default(),
        };

        let headline = format!(
            "{} {} to {}",
            self.plan.manifest.stack, self.plan.version, self.plan.environment
        );
        self.log.info(SESSION, format!("deploying {headline}"));
        notifier
            .notify(NotificationStatus::Info, format!("Deploying {headline}"))
            .await;

        for step in Step::SEQUENCE {
            self.enter(step.state());
            self.log.debug(step.name(), "started");

            match self.execute(step, &env).await {
                StepOutcome::Success => self.log.info(step.name(), "done"),
                StepOutcome::Warning(warnings) => {
                    for warning in warnings {
                        self.log.warn(step.name(), &warning.message);
                        self.diagnostics.warn(warning);
                    }
                    self.log.info(step.name(), "done with warnings");
                }
                StepOutcome::Fatal(error) => {
                    return Err(self.fail(step, error, &notifier).await);
                }
            }
        }

        self.enter(SessionState::Succeeded);
        let status = if self.diagnostics.has_warnings() {
            NotificationStatus::Warning
        } else {
            NotificationStatus::Success
        };
        notifier
            .notify(status, format!("Deployed {headline}"))
            .await;

        Ok(self.finish(RollbackOutcome::NotOffered).await)
    }

    fn enter(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{} -> {next}",
            self.state
        );
        if self.state != next {
            self.log
                .debug(SESSION, format!("{} -> {next}", self.state));
            self.state = next;
        }
    }

    fn runtime(&self) -> Result<&'a R, DeployError> {
        match &self.runtime {
            Ok(runtime) => Ok(*runtime),
            Err(reason) => Err(DeployError::validation(
                PreflightCheck::Runtime,
                reason.clone(),
            )),
        }
    }

    async fn execute(&mut self, step: Step, env: &Result<EnvFile, ConfigError>) -> StepOutcome {
        let result = match step {
            Step::Preflight => self.preflight(env).await,
            _ => match self.runtime() {
                Ok(runtime) => self.execute_on(step, runtime).await,
                Err(e) => Err(e),
            },
        };
        StepOutcome::from_result(result)
    }

    async fn execute_on(&mut self, step: Step, runtime: &'a R) -> Result<Vec<Warning>, DeployError> {
        match step {
            Step::Preflight => Ok(Vec::new()),
            Step::Backup => {
                let (record, warnings) = BackupManager::new(runtime, &self.plan, &self.log)
                    .snapshot()
                    .await?;
                self.backup = Some(record);
                Ok(warnings)
            }
            Step::Provision => ImageProvisioner::new(runtime, &self.plan, &self.log)
                .provision()
                .await
                .map(|_| Vec::new()),
            Step::Migrate => MigrationRunner::new(runtime)
                .run(&self.plan, &self.log)
                .await
                .map(|outcome| {
                    if outcome == MigrationOutcome::NotPending {
                        self.log.debug(step.name(), "nothing pending");
                    }
                    Vec::new()
                }),
            Step::Rollout => RolloutController::new(runtime, self.probe, &self.plan, &self.log)
                .rollout(&mut self.instances)
                .await
                .map(|_| Vec::new()),
            Step::SupportingUpdate => Ok(SupportingServiceUpdater::new(
                runtime, &self.plan, &self.log,
            )
            .refresh(&mut self.instances)
            .await),
            Step::Verify => VerificationSuite::new(runtime, self.probe, &self.plan, &self.log)
                .run(&mut self.instances)
                .await,
        }
    }

    async fn preflight(
        &mut self,
        env: &Result<EnvFile, ConfigError>,
    ) -> Result<Vec<Warning>, DeployError> {
        let validator = match &self.runtime {
            Ok(runtime) => PreflightValidator::new(*runtime, self.host, &self.log),
            Err(reason) => PreflightValidator::unreachable(reason.clone(), self.host, &self.log),
        };
        validator.run(&self.plan.manifest, env).await?;
        if let Ok(env) = env {
            self.plan.env = env.clone();
        }
        Ok(Vec::new())
    }

    async fn fail(
        mut self,
        step: Step,
        error: DeployError,
        notifier: &NotificationDispatcher,
    ) -> SessionFailed {
        self.enter(SessionState::Failed);
        self.log
            .error(step.name(), format!("{error}; remaining steps skipped"));
        notifier
            .notify(
                NotificationStatus::Error,
                format!(
                    "Deployment of {} {} to {} failed during {step}: {error}",
                    self.plan.manifest.stack, self.plan.version, self.plan.environment
                ),
            )
            .await;

        // Nothing has changed before the backup step.
        let rollback = if step == Step::Preflight {
            RollbackOutcome::NotOffered
        } else if self
            .approval
            .approve_rollback(&format!("Deployment failed during {step}: {error}"))
            .await
        {
            self.roll_back(notifier).await
        } else {
            self.log.info(SESSION, "rollback declined");
            RollbackOutcome::Declined
        };

        let summary = self.finish(rollback).await;
        SessionFailed {
            error,
            summary: Box::new(summary),
        }
    }

    async fn roll_back(&mut self, notifier: &NotificationDispatcher) -> RollbackOutcome {
        let result = match self.runtime() {
            Ok(runtime) => {
                RollbackManager::new(runtime, self.probe, &self.plan, &self.log)
                    .rollback()
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(report) => {
                self.enter(SessionState::RolledBack);
                notifier
                    .notify(
                        NotificationStatus::Warning,
                        format!(
                            "Rolled back {} to backup {}",
                            self.plan.manifest.stack, report.backup_id
                        ),
                    )
                    .await;
                RollbackOutcome::Restored {
                    backup_id: report.backup_id,
                    version: report.restored_version,
                }
            }
            Err(e) => {
                self.log.error(SESSION, format!("rollback failed: {e}"));
                notifier
                    .notify(
                        NotificationStatus::Error,
                        format!("Rollback of {} failed: {e}", self.plan.manifest.stack),
                    )
                    .await;
                RollbackOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Add every managed container not already tracked, so the summary
    /// covers services this session did not touch.
    async fn snapshot_instances(&mut self) {
        let Ok(runtime) = self.runtime() else {
            return;
        };
        let filters = ContainerFilters::for_stack(self.plan.manifest.stack.as_str(), true);
        match runtime.list_containers(&filters).await {
            Ok(containers) => {
                for container in &containers {
                    if self
                        .instances
                        .get(&ContainerId::new(container.name.clone()))
                        .is_none()
                    {
                        self.instances.upsert(ServiceInstance::from_summary(container));
                    }
                }
            }
            Err(e) => self
                .log
                .warn(SESSION, format!("cannot list stack containers: {e}")),
        }
    }

    async fn finish(mut self, rollback: RollbackOutcome) -> SessionSummary {
        self.snapshot_instances().await;

        let summary = SessionSummary {
            version: self.plan.version.to_string(),
            environment: self.plan.environment.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            state: self.state,
            warnings: self.diagnostics.warnings().to_vec(),
            instances: self.instances.to_vec(),
            backup: self.backup.as_ref().map(|b| b.id().to_string()),
            rollback,
            log_path: self.log.path().map(PathBuf::from),
        };

        for line in summary.render().lines() {
            self.log.info(SESSION, line);
        }
        summary
    }
}
