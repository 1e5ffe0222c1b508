// ABOUTME: The ordered list of deployment steps and their tri-state outcome.
// ABOUTME: Each step maps to the session state it runs in.

use super::error::DeployError;
use super::state::SessionState;
use crate::diagnostics::Warning;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Preflight,
    Backup,
    Provision,
    Migrate,
    Rollout,
    SupportingUpdate,
    Verify,
}

impl Step {
    /// Execution order.
    pub const SEQUENCE: [Step; 7] = [
        Step::Preflight,
        Step::Backup,
        Step::Provision,
        Step::Migrate,
        Step::Rollout,
        Step::SupportingUpdate,
        Step::Verify,
    ];

    pub fn state(self) -> SessionState {
        match self {
            Step::Preflight => SessionState::Validating,
            Step::Backup => SessionState::BackingUp,
            Step::Provision => SessionState::Provisioning,
            Step::Migrate => SessionState::Migrating,
            Step::Rollout | Step::SupportingUpdate => SessionState::RollingOut,
            Step::Verify => SessionState::Verifying,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::Preflight => "preflight",
            Step::Backup => "backup",
            Step::Provision => "provision",
            Step::Migrate => "migrate",
            Step::Rollout => "rollout",
            Step::SupportingUpdate => "supporting",
            Step::Verify => "verify",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one step: clean, degraded, or fatal.
#[derive(Debug)]
pub enum StepOutcome {
    Success,
    Warning(Vec<Warning>),
    Fatal(DeployError),
}

impl StepOutcome {
    /// Non-fatal errors become warnings.
    pub fn from_result(result: Result<Vec<Warning>, DeployError>) -> Self {
        match result {
            Ok(warnings) if warnings.is_empty() => StepOutcome::Success,
            Ok(warnings) => StepOutcome::Warning(warnings),
            Err(e) if e.is_fatal() => StepOutcome::Fatal(e),
            Err(e) => StepOutcome::Warning(vec![Warning::from_error(&e)]),
        }
    }
}
