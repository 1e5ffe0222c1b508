// ABOUTME: Error taxonomy for deployment sessions.
// ABOUTME: Each error knows its kind and whether it aborts the session.

use crate::config::ConfigError;
use crate::health::HealthCheckExhausted;
use nonempty::NonEmpty;
use std::fmt;

/// Which preflight check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightCheck {
    Runtime,
    OrchestrationTool,
    DiskSpace,
    EnvironmentFile,
    Credential,
}

impl fmt::Display for PreflightCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PreflightCheck::Runtime => "container runtime",
            PreflightCheck::OrchestrationTool => "orchestration tool",
            PreflightCheck::DiskSpace => "disk space",
            PreflightCheck::EnvironmentFile => "environment file",
            PreflightCheck::Credential => "credential",
        };
        write!(f, "{s}")
    }
}

/// One failed preflight check and what it found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub check: PreflightCheck,
    pub message: String,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.message)
    }
}

fn describe_failures(failures: &NonEmpty<CheckFailure>) -> String {
    if failures.tail.is_empty() {
        let only = &failures.head;
        return format!("preflight check failed ({}): {}", only.check, only.message);
    }
    let all: Vec<String> = failures.iter().map(ToString::to_string).collect();
    format!("preflight checks failed ({})", all.join("; "))
}

/// Errors raised by deployment steps and rollback.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// One or more preflight checks failed before anything was changed.
    #[error("{}", describe_failures(.failures))]
    Validation { failures: NonEmpty<CheckFailure> },

    /// An artifact could not be fetched.
    #[error("failed to fetch {image}: {message}")]
    Provision { image: String, message: String },

    /// The migration procedure failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// An instance or endpoint never became healthy.
    #[error("{context}: {source}")]
    HealthCheckExhausted {
        context: String,
        #[source]
        source: HealthCheckExhausted,
    },

    /// An optional dependency is unreachable.
    #[error("optional dependency degraded: {0}")]
    DependencyDegraded(String),

    /// Some backup sub-steps failed.
    #[error("backup incomplete: {0}")]
    BackupPartialFailure(String),

    /// Every backup sub-step failed.
    #[error("backup failed: {0}")]
    Backup(String),

    /// A runtime operation failed while replacing instances.
    #[error("rollout failed: {0}")]
    Rollout(String),

    /// Post-rollout checks failed.
    #[error("verification failed: {0}")]
    Verification(String),

    /// No backup pointer exists.
    #[error("rollback unavailable: {0}")]
    RollbackUnavailable(String),

    /// Restoring from the backup failed.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Classification of deploy errors, one per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Validation,
    Provision,
    Migration,
    HealthCheckExhausted,
    DependencyDegraded,
    BackupPartialFailure,
    Backup,
    Rollout,
    Verification,
    RollbackUnavailable,
    RollbackFailed,
    Config,
}

impl DeployError {
    pub fn validation(check: PreflightCheck, message: impl Into<String>) -> Self {
        DeployError::Validation {
            failures: NonEmpty::new(CheckFailure {
                check,
                message: message.into(),
            }),
        }
    }

    /// Preflight checks that failed, in evaluation order. Empty for other errors.
    pub fn failed_checks(&self) -> Vec<PreflightCheck> {
        match self {
            DeployError::Validation { failures } => failures.iter().map(|f| f.check).collect(),
            _ => Vec::new(),
        }
    }

    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Validation { .. } => DeployErrorKind::Validation,
            DeployError::Provision { .. } => DeployErrorKind::Provision,
            DeployError::Migration(_) => DeployErrorKind::Migration,
            DeployError::HealthCheckExhausted { .. } => DeployErrorKind::HealthCheckExhausted,
            DeployError::DependencyDegraded(_) => DeployErrorKind::DependencyDegraded,
            DeployError::BackupPartialFailure(_) => DeployErrorKind::BackupPartialFailure,
            DeployError::Backup(_) => DeployErrorKind::Backup,
            DeployError::Rollout(_) => DeployErrorKind::Rollout,
            DeployError::Verification(_) => DeployErrorKind::Verification,
            DeployError::RollbackUnavailable(_) => DeployErrorKind::RollbackUnavailable,
            DeployError::RollbackFailed(_) => DeployErrorKind::RollbackFailed,
            DeployError::Config(_) => DeployErrorKind::Config,
        }
    }

    /// Fatal errors halt the session; the rest are logged as warnings.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            DeployErrorKind::DependencyDegraded | DeployErrorKind::BackupPartialFailure
        )
    }
}
