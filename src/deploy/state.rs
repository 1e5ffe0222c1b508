// ABOUTME: Deployment session lifecycle states and the transitions allowed between them.
// ABOUTME: Happy-path states only move forward; any live state may fail; failure may roll back once.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Initializing,
    Validating,
    BackingUp,
    Provisioning,
    Migrating,
    RollingOut,
    Verifying,
    Succeeded,
    Failed,
    RolledBack,
}

impl SessionState {
    /// Position along the happy path.
    fn rank(self) -> Option<u8> {
        match self {
            SessionState::Initializing => Some(0),
            SessionState::Validating => Some(1),
            SessionState::BackingUp => Some(2),
            SessionState::Provisioning => Some(3),
            SessionState::Migrating => Some(4),
            SessionState::RollingOut => Some(5),
            SessionState::Verifying => Some(6),
            SessionState::Succeeded => Some(7),
            SessionState::Failed | SessionState::RolledBack => None,
        }
    }

    /// Succeeded and RolledBack end a session. Failed ends it unless a
    /// rollback is approved.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::RolledBack)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Failed, SessionState::RolledBack) => true,
            (SessionState::Succeeded | SessionState::Failed | SessionState::RolledBack, _) => false,
            (_, SessionState::Failed) => true,
            (from, to) => match (from.rank(), to.rank()) {
                (Some(a), Some(b)) => b >= a,
                _ => false,
            },
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Initializing => "INITIALIZING",
            SessionState::Validating => "VALIDATING",
            SessionState::BackingUp => "BACKING_UP",
            SessionState::Provisioning => "PROVISIONING",
            SessionState::Migrating => "MIGRATING",
            SessionState::RollingOut => "ROLLING_OUT",
            SessionState::Verifying => "VERIFYING",
            SessionState::Succeeded => "SUCCEEDED",
            SessionState::Failed => "FAILED",
            SessionState::RolledBack => "ROLLED_BACK",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}
