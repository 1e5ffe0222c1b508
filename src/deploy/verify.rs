// ABOUTME: Post-rollout verification: health, secondary endpoints, smoke request and data store ping.
// ABOUTME: Runs every check, then fails listing each required failure; optional failures only warn.

use super::error::DeployError;
use super::instance::{HealthStatus, InstanceRole, InstanceTable};
use super::log::SessionLog;
use super::plan::ReleasePlan;
use crate::config::CheckConfig;
use crate::diagnostics::Warning;
use crate::health::{HealthCheckPolicy, HealthCheckPoller, HttpProbe};
use crate::runtime::{ExecConfig, ExecOps};
use crate::types::ContainerId;

const STEP: &str = "verify";

pub struct VerificationSuite<'a, R: ExecOps> {
    runtime: &'a R,
    probe: &'a dyn HttpProbe,
    plan: &'a ReleasePlan,
    log: &'a SessionLog,
}

#[derive(Default)]
struct Tally {
    failures: Vec<String>,
    warnings: Vec<Warning>,
}

impl<'a, R: ExecOps> VerificationSuite<'a, R> {
    pub fn new(
        runtime: &'a R,
        probe: &'a dyn HttpProbe,
        plan: &'a ReleasePlan,
        log: &'a SessionLog,
    ) -> Self {
        Self {
            runtime,
            probe,
            plan,
            log,
        }
    }

    pub async fn run(&self, instances: &mut InstanceTable) -> Result<Vec<Warning>, DeployError> {
        let mut tally = Tally::default();
        let policy = HealthCheckPolicy::verify(&self.plan.manifest.health);
        let poller = HealthCheckPoller::new(self.probe);

        match poller.poll(&policy).await {
            Ok(attempt) => {
                self.log
                    .info(STEP, format!("primary health passed at attempt {attempt}"));
                instances.mark_role(InstanceRole::Primary, HealthStatus::Healthy);
            }
            Err(e) => {
                instances.mark_role(InstanceRole::Primary, HealthStatus::Unhealthy);
                self.fail(&mut tally, format!("primary health: {e}"));
            }
        }

        for check in &self.plan.manifest.verification.checks {
            self.run_check(&poller, &policy, check, &mut tally).await;
        }

        self.run_smoke(&mut tally).await;
        self.ping_datastore(&mut tally).await;
        self.check_supporting(&poller, &policy, &mut tally).await;

        if tally.failures.is_empty() {
            self.log.info(STEP, "verification passed");
            Ok(tally.warnings)
        } else {
            Err(DeployError::Verification(tally.failures.join("; ")))
        }
    }

    fn fail(&self, tally: &mut Tally, message: String) {
        self.log.error(STEP, &message);
        tally.failures.push(message);
    }

    fn degrade(&self, tally: &mut Tally, message: String) {
        self.log.warn(STEP, &message);
        tally.warnings.push(Warning::dependency_degraded(message));
    }

    async fn run_check(
        &self,
        poller: &HealthCheckPoller<'_>,
        base: &HealthCheckPolicy,
        check: &CheckConfig,
        tally: &mut Tally,
    ) {
        let policy = base
            .with_endpoint(&check.url)
            .with_token(check.token.clone().or_else(|| base.token.clone()));

        match poller.poll(&policy).await {
            Ok(_) => self.log.info(STEP, format!("{} check passed", check.name)),
            Err(e) if check.required => self.fail(tally, format!("{} check: {e}", check.name)),
            Err(e) => self.degrade(tally, format!("{} check: {e}", check.name)),
        }
    }

    /// Any completed HTTP response counts as the service responding.
    async fn run_smoke(&self, tally: &mut Tally) {
        let Some(ref smoke) = self.plan.manifest.verification.smoke else {
            return;
        };

        match self.probe.post_json(&smoke.url, &smoke.body).await {
            Ok(response) if response.status >= 500 => {
                let message = format!(
                    "smoke request to {} answered {}; counted as responding",
                    smoke.url, response.status
                );
                self.log.warn(STEP, &message);
                tally.warnings.push(Warning::smoke_response(message));
            }
            Ok(response) => self.log.info(
                STEP,
                format!("smoke request answered {}", response.status),
            ),
            Err(e) => self.fail(tally, format!("smoke request to {}: {e}", smoke.url)),
        }
    }

    async fn ping_datastore(&self, tally: &mut Tally) {
        let Some(ref datastore) = self.plan.manifest.datastore else {
            return;
        };
        let container = ContainerId::new(datastore.container.clone());
        let ping = ExecConfig::command(datastore.ping_command.iter().cloned());

        match self.runtime.exec(&container, &ping).await {
            Ok(result) if !result.success() => self.fail(
                tally,
                format!("data store ping exited with code {}", result.exit_code),
            ),
            Ok(result) => {
                // Runtimes that detach exec sessions return no output; the
                // exit code alone decides there.
                let stdout = result.stdout_lossy();
                if stdout.trim().is_empty() || stdout.contains(&datastore.ping_token) {
                    self.log.info(STEP, "data store answered ping");
                } else {
                    self.fail(
                        tally,
                        format!("data store ping answered {:?}", stdout.trim()),
                    );
                }
            }
            Err(e) => self.fail(tally, format!("data store ping: {e}")),
        }
    }

    async fn check_supporting(
        &self,
        poller: &HealthCheckPoller<'_>,
        base: &HealthCheckPolicy,
        tally: &mut Tally,
    ) {
        for service in &self.plan.manifest.supporting {
            let Some(ref url) = service.health_url else {
                continue;
            };
            let policy = base.with_endpoint(url).with_token(None);
            match poller.poll(&policy).await {
                Ok(_) => self.log.info(STEP, format!("{} is healthy", service.name)),
                Err(e) => self.degrade(tally, format!("supporting service {}: {e}", service.name)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Manifest;
    use crate::diagnostics::WarningKind;
    use crate::health::ProbeResponse;
    use crate::health::fake::ScriptedProbe;
    use crate::runtime::fake::ScriptedRuntime;
    use crate::types::Version;

    const HEALTH: &str = "http://localhost:8000/health";
    const DETAILED: &str = "http://localhost:8000/health/detailed";
    const METRICS: &str = "http://localhost:9090/-/healthy";
    const SMOKE: &str = "http://localhost:8000/api/v1/scan";
    const GRAFANA: &str = "http://localhost:3000/api/health";

    fn plan() -> ReleasePlan {
        let manifest = Manifest::from_yaml(&format!(
            r#"
stack: shop
primary:
  name: api
  image: ghcr.io/acme/api
datastore:
  container: shop-redis
supporting:
  - name: grafana
    image: grafana/grafana:10.2.0
    health_url: {GRAFANA}
verification:
  checks:
    - name: detailed
      url: {DETAILED}
    - name: metrics
      url: {METRICS}
      required: false
  smoke:
    url: {SMOKE}
health:
  endpoint: {HEALTH}
"#
        ))
        .unwrap();
        ReleasePlan::new(manifest, Version::new("v2").unwrap(), "production")
    }

    fn all_healthy() -> ScriptedProbe {
        let probe = ScriptedProbe::new();
        probe
            .always(HEALTH, ScriptedProbe::healthy())
            .always(DETAILED, ScriptedProbe::healthy())
            .always(METRICS, ScriptedProbe::healthy())
            .always(SMOKE, Ok(ProbeResponse::new(200, "{}")))
            .always(GRAFANA, Ok(ProbeResponse::new(200, r#"{"database":"ok"}"#)));
        probe
    }

    fn store(runtime: &ScriptedRuntime) {
        runtime.seed("shop-redis", "redis:7", Default::default());
        runtime.set_exec_result("shop-redis", 0, "PONG\n");
    }

    #[tokio::test(start_paused = true)]
    async fn everything_healthy_passes_clean() {
        let runtime = ScriptedRuntime::new();
        store(&runtime);
        let probe = all_healthy();
        let plan = plan();
        let log = SessionLog::in_memory();

        let warnings = VerificationSuite::new(&runtime, &probe, &plan, &log)
            .run(&mut InstanceTable::default())
            .await
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(runtime.calls_matching("exec shop-redis redis-cli ping").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn smoke_server_error_still_passes() {
        let runtime = ScriptedRuntime::new();
        store(&runtime);
        let probe = all_healthy();
        probe.always(SMOKE, Ok(ProbeResponse::new(500, "internal error")));
        let plan = plan();
        let log = SessionLog::in_memory();

        let warnings = VerificationSuite::new(&runtime, &probe, &plan, &log)
            .run(&mut InstanceTable::default())
            .await
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::SmokeResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn smoke_connection_failure_fails() {
        let runtime = ScriptedRuntime::new();
        store(&runtime);
        let probe = all_healthy();
        probe.always(SMOKE, ScriptedProbe::refused());
        let plan = plan();
        let log = SessionLog::in_memory();

        let err = VerificationSuite::new(&runtime, &probe, &plan, &log)
            .run(&mut InstanceTable::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("smoke request"));
    }

    #[tokio::test(start_paused = true)]
    async fn optional_failures_warn_and_required_failures_are_all_listed() {
        let runtime = ScriptedRuntime::new();
        store(&runtime);
        runtime.set_exec_result("shop-redis", 1, "");
        let probe = all_healthy();
        probe
            .always(METRICS, ScriptedProbe::refused())
            .always(GRAFANA, ScriptedProbe::refused())
            .always(DETAILED, ScriptedProbe::unhealthy());
        let plan = plan();
        let log = SessionLog::in_memory();

        let err = VerificationSuite::new(&runtime, &probe, &plan, &log)
            .run(&mut InstanceTable::default())
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("detailed check"));
        assert!(message.contains("data store ping exited with code 1"));
        assert!(!message.contains("metrics"));
        assert!(log.contains(STEP, "metrics check"));
        assert!(log.contains(STEP, "supporting service grafana"));
        // Verification polls use the tight budget.
        assert_eq!(probe.calls_to(DETAILED), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_ping_output_relies_on_exit_code() {
        let runtime = ScriptedRuntime::new();
        runtime.seed("shop-redis", "redis:7", Default::default());
        let probe = all_healthy();
        let plan = plan();
        let log = SessionLog::in_memory();

        VerificationSuite::new(&runtime, &probe, &plan, &log)
            .run(&mut InstanceTable::default())
            .await
            .unwrap();
        assert!(log.contains(STEP, "data store answered ping"));
    }
}
