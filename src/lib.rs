// ABOUTME: Library root for stagehand - exposes the orchestration engine for the CLI and tests.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod notify;
pub mod output;
pub mod runtime;
pub mod types;
