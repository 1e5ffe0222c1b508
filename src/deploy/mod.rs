// ABOUTME: Deployment orchestration: one session running ordered steps against a container runtime.
// ABOUTME: Exports the session, its step components and the error taxonomy.

mod approval;
mod backup;
mod error;
mod instance;
mod log;
mod migration;
mod plan;
mod preflight;
mod provision;
mod replacement;
mod rollback;
mod rollout;
mod session;
mod state;
mod step;
mod strategy;
mod supporting;
mod verify;

pub use approval::{ApprovalGate, FixedAnswer, StdinPrompt};
pub use backup::{BackupArtifact, BackupError, BackupManager, BackupRecord, BackupStore};
pub use error::{CheckFailure, DeployError, DeployErrorKind, PreflightCheck};
pub use instance::{HealthStatus, InstanceRole, InstanceTable, ServiceInstance};
pub use log::{LogEntry, LogLevel, SessionLog};
pub use migration::{MigrationOutcome, MigrationRunner};
pub use plan::{ROLE_MIGRATION, ROLE_PRIMARY, ROLE_SUPPORTING, ReleasePlan};
pub use preflight::{HostInspector, LocalHost, PreflightValidator};
pub use provision::ImageProvisioner;
pub use replacement::{Pending, Replacement, Started, TransitionResult, Vacated, Verified};
pub use rollback::{RollbackManager, RollbackReport};
pub use rollout::RolloutController;
pub use session::{DeploymentSession, RollbackOutcome, SessionFailed, SessionSummary};
pub use state::{InvalidTransition, SessionState};
pub use step::{Step, StepOutcome};
pub use strategy::RolloutMode;
pub use supporting::SupportingServiceUpdater;
pub use verify::VerificationSuite;
