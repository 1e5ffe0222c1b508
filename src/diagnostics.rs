// ABOUTME: Diagnostics accumulator for non-fatal warnings during a deployment session.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be shown to users.

use crate::deploy::{DeployError, DeployErrorKind};
use serde::Serialize;

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A backup sub-step failed while others succeeded.
    pub fn backup_partial(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::BackupPartial,
            message: message.into(),
        }
    }

    /// An optional dependency or supporting service is unhealthy.
    pub fn dependency_degraded(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::DependencyDegraded,
            message: message.into(),
        }
    }

    /// The smoke request got an error status. It still counts as responding.
    pub fn smoke_response(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SmokeResponse,
            message: message.into(),
        }
    }

    /// A temporary resource could not be released.
    pub fn cleanup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Cleanup,
            message: message.into(),
        }
    }

    /// Downgrade a non-fatal error.
    pub fn from_error(error: &DeployError) -> Self {
        let kind = match error.kind() {
            DeployErrorKind::BackupPartialFailure => WarningKind::BackupPartial,
            _ => WarningKind::DependencyDegraded,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Backup captured only some sub-artifacts.
    BackupPartial,
    /// Optional dependency or supporting service failed.
    DependencyDegraded,
    /// Smoke request answered with a server error.
    SmokeResponse,
    /// Temporary container or file left behind.
    Cleanup,
}
