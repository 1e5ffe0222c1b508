// ABOUTME: Rollback command implementation.
// ABOUTME: Restores the latest backup outside a deployment session, after confirmation.

use super::runtime_connection::connect_to_runtime;
use chrono::Utc;
use stagehand::config::{EnvFile, Manifest};
use stagehand::deploy::{ApprovalGate, ReleasePlan, RollbackManager, SessionLog, StdinPrompt};
use stagehand::error::{Error, Result};
use stagehand::health::ReqwestProbe;
use stagehand::output::Output;
use stagehand::types::Version;

/// Version placeholder; the backup record names the version to restore.
const UNKNOWN_VERSION: &str = "latest";

pub async fn rollback(
    manifest: Manifest,
    environment: &str,
    yes: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();

    if !yes {
        let reason = format!("Manual rollback of {} ({environment})", manifest.stack);
        if !StdinPrompt.approve_rollback(&reason).await {
            return Err(Error::Cancelled);
        }
    }

    let runtime = connect_to_runtime(&manifest, &output)?;
    let probe = ReqwestProbe::new(manifest.health.timeout)?;

    let env_path = EnvFile::path_for(&manifest.root, environment);
    let env = match EnvFile::load(&env_path) {
        Ok(env) => env,
        Err(e) => {
            output.warning(&format!("continuing without environment values: {e}"));
            EnvFile::default()
        }
    };

    let log = SessionLog::open(&manifest.log_dir(), Utc::now());
    let plan = ReleasePlan::new(manifest, Version::new(UNKNOWN_VERSION)?, environment).with_env(env);

    output.progress("  → Restoring latest backup...");
    let report = RollbackManager::new(&runtime, &probe, &plan, &log)
        .rollback()
        .await?;

    output.success(&format!(
        "Rolled back to backup {} ({})",
        report.backup_id,
        report.restored_version.as_deref().unwrap_or("version unknown")
    ));
    Ok(())
}
