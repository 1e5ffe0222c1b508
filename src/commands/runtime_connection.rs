// ABOUTME: Shared helper for connecting to the local container runtime.
// ABOUTME: Used by the deploy, rollback, and status commands.

use stagehand::config::Manifest;
use stagehand::deploy::{DeployError, PreflightCheck};
use stagehand::error::Result;
use stagehand::output::Output;
use stagehand::runtime::{BollardRuntime, RuntimeError, connect_local};

/// Connect to the runtime named by the manifest, or the detected one.
pub fn try_connect(
    manifest: &Manifest,
    output: &Output,
) -> std::result::Result<BollardRuntime, RuntimeError> {
    output.progress("  → Connecting to container runtime...");
    connect_local(manifest.runtime.as_ref())
}

/// Like [`try_connect`], for commands that cannot continue without a runtime.
///
/// An unreachable runtime is reported as a failed preflight check, since
/// nothing can have been changed yet.
pub fn connect_to_runtime(manifest: &Manifest, output: &Output) -> Result<BollardRuntime> {
    let runtime = try_connect(manifest, output)
        .map_err(|e| DeployError::validation(PreflightCheck::Runtime, e.to_string()))?;
    Ok(runtime)
}
