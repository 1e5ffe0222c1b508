// ABOUTME: Status command implementation.
// ABOUTME: Lists the managed containers of the stack with a one-shot primary health probe.

use super::runtime_connection::connect_to_runtime;
use stagehand::config::Manifest;
use stagehand::deploy::{HealthStatus, InstanceRole, ServiceInstance};
use stagehand::error::Result;
use stagehand::health::{HealthCheckPolicy, HealthCheckPoller, ReqwestProbe};
use stagehand::output::Output;
use stagehand::runtime::{ContainerFilters, ContainerOps};

pub async fn status(manifest: Manifest, output: Output) -> Result<()> {
    let runtime = connect_to_runtime(&manifest, &output)?;
    let probe = ReqwestProbe::new(manifest.health.timeout)?;

    let filters = ContainerFilters::for_stack(manifest.stack.as_str(), true);
    let containers = runtime.list_containers(&filters).await?;

    let mut policy = HealthCheckPolicy::verify(&manifest.health);
    policy.max_attempts = 1;
    let primary_health = match HealthCheckPoller::new(&probe).poll(&policy).await {
        Ok(_) => HealthStatus::Healthy,
        Err(_) => HealthStatus::Unhealthy,
    };

    let instances: Vec<ServiceInstance> = containers
        .iter()
        .map(|c| {
            let mut instance = ServiceInstance::from_summary(c);
            if instance.role == InstanceRole::Primary && c.state.is_running() {
                instance.mark(primary_health);
            }
            instance
        })
        .collect();

    output.progress(&format!(
        "{}: {} managed container(s), health endpoint {}",
        manifest.stack,
        instances.len(),
        primary_health
    ));
    output.instances(&instances);
    Ok(())
}
