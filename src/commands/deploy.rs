// ABOUTME: Deploy command implementation.
// ABOUTME: Wires the real runtime, HTTP probe and approval prompt into a deployment session.

use super::runtime_connection::try_connect;
use stagehand::config::Manifest;
use stagehand::deploy::{
    ApprovalGate, DeploymentSession, FixedAnswer, LocalHost, ReleasePlan, StdinPrompt,
};
use stagehand::error::Result;
use stagehand::health::ReqwestProbe;
use stagehand::output::Output;
use stagehand::runtime::BollardRuntime;
use stagehand::types::Version;

pub async fn deploy(
    manifest: Manifest,
    version: &str,
    environment: &str,
    non_interactive: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let version = Version::new(version)?;

    output.progress(&format!(
        "Deploying {} {} to {}",
        manifest.stack, version, environment
    ));

    // A missing runtime is reported by the session's preflight step along
    // with every other failed check.
    let connection = try_connect(&manifest, &output);
    let probe = ReqwestProbe::new(manifest.health.timeout)?;
    let host = LocalHost;
    let approval: Box<dyn ApprovalGate> = if non_interactive {
        Box::new(FixedAnswer(false))
    } else {
        Box::new(StdinPrompt)
    };

    let plan = ReleasePlan::new(manifest, version, environment);
    let session = match &connection {
        Ok(runtime) => DeploymentSession::new(plan, runtime, &probe, &host, approval.as_ref()),
        Err(e) => DeploymentSession::<BollardRuntime>::unreachable(
            plan,
            e.to_string(),
            &probe,
            &host,
            approval.as_ref(),
        ),
    };
    if let Some(path) = session.log().path() {
        output.progress(&format!("  → Logging to {}", path.display()));
    }

    match session.run().await {
        Ok(summary) => {
            output.summary(&summary);
            for warning in &summary.warnings {
                output.warning(&warning.message);
            }
            output.success("Deployment complete!");
            Ok(())
        }
        Err(failed) => {
            output.summary(&failed.summary);
            Err(failed.into())
        }
    }
}
