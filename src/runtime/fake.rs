// ABOUTME: Scripted in-memory container runtime used by unit tests.
// ABOUTME: Records every call in order and tracks how many replicas stay running.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ArchiveError, ArchiveOps, ContainerConfig, ContainerError, ContainerFilters, ContainerInfo,
    ContainerOps, ContainerState, ContainerSummary, ExecConfig, ExecError, ExecOps, ExecResult,
    ImageError, ImageOps, NetworkConfig, NetworkError, NetworkOps, RuntimeInfo, RuntimeInfoError,
    labels,
};
use crate::types::{ContainerId, ImageRef, NetworkId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone)]
struct FakeContainer {
    image: String,
    labels: HashMap<String, String>,
    running: bool,
}

/// Canned answer for a copy out of a container.
#[derive(Debug, Clone)]
pub(crate) enum ArchiveScript {
    Bytes(Vec<u8>),
    Denied,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    containers: BTreeMap<String, FakeContainer>,
    networks: HashSet<String>,
    failing_pulls: HashSet<String>,
    failing_starts: HashSet<String>,
    exec_results: HashMap<String, ExecResult>,
    archives: HashMap<String, ArchiveScript>,
    wait_exit_code: i64,
    ping_fails: bool,
    /// Fewest running replicas per service seen after a runtime call. Seeding is not a call.
    low_water: HashMap<String, usize>,
}

impl FakeState {
    fn running_for(&self, service: &str) -> usize {
        self.containers
            .values()
            .filter(|c| {
                c.running
                    && c.labels.get(labels::SERVICE).map(String::as_str) == Some(service)
                    && c.labels.get(labels::ROLE).map(String::as_str) != Some("migration")
            })
            .count()
    }

    fn observe(&mut self) {
        let services: HashSet<String> = self
            .containers
            .values()
            .filter_map(|c| c.labels.get(labels::SERVICE).cloned())
            .collect();
        for service in services {
            let running = self.running_for(&service);
            let entry = self.low_water.entry(service).or_insert(running);
            *entry = (*entry).min(running);
        }
    }
}

/// Container runtime double. Container IDs are the container names.
#[derive(Default)]
pub(crate) struct ScriptedRuntime {
    state: Mutex<FakeState>,
}

impl ScriptedRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seed an existing container.
    pub(crate) fn seed(&self, name: &str, image: &str, labels: HashMap<String, String>) {
        let mut state = self.state.lock();
        state.containers.insert(
            name.to_string(),
            FakeContainer {
                image: image.to_string(),
                labels,
                running: true,
            },
        );
    }

    pub(crate) fn seed_stopped(&self, name: &str, image: &str, labels: HashMap<String, String>) {
        self.seed(name, image, labels);
        let mut state = self.state.lock();
        if let Some(c) = state.containers.get_mut(name) {
            c.running = false;
        }
    }

    pub(crate) fn fail_pull(&self, image: &str) {
        self.state.lock().failing_pulls.insert(image.to_string());
    }

    pub(crate) fn fail_start(&self, name: &str) {
        self.state.lock().failing_starts.insert(name.to_string());
    }

    pub(crate) fn fail_ping(&self) {
        self.state.lock().ping_fails = true;
    }

    pub(crate) fn set_exec_result(&self, container: &str, exit_code: i64, stdout: &str) {
        self.state.lock().exec_results.insert(
            container.to_string(),
            ExecResult {
                exit_code,
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
            },
        );
    }

    pub(crate) fn set_archive(&self, path: &str, script: ArchiveScript) {
        self.state.lock().archives.insert(path.to_string(), script);
    }

    pub(crate) fn set_wait_exit_code(&self, code: i64) {
        self.state.lock().wait_exit_code = code;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub(crate) fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.state.lock().containers.contains_key(name)
    }

    pub(crate) fn is_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .containers
            .get(name)
            .is_some_and(|c| c.running)
    }

    pub(crate) fn image_of(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .containers
            .get(name)
            .map(|c| c.image.clone())
    }

    /// Fewest running containers of a service seen at any point.
    pub(crate) fn min_running(&self, service: &str) -> Option<usize> {
        self.state.lock().low_water.get(service).copied()
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

impl Sealed for ScriptedRuntime {}

#[async_trait]
impl RuntimeInfo for ScriptedRuntime {
    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.record("ping".to_string());
        if self.state.lock().ping_fails {
            return Err(RuntimeInfoError::ConnectionFailed(
                "daemon not responding".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageOps for ScriptedRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image = reference.to_string();
        self.record(format!("pull {image}"));
        if self.state.lock().failing_pulls.contains(&image) {
            return Err(ImageError::NotFound(image));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerOps for ScriptedRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        self.record(format!("create {} {}", config.name, config.image));
        let mut state = self.state.lock();
        if state.containers.contains_key(&config.name) {
            return Err(ContainerError::AlreadyExists(config.name.clone()));
        }
        state.containers.insert(
            config.name.clone(),
            FakeContainer {
                image: config.image.to_string(),
                labels: config.labels.clone(),
                running: false,
            },
        );
        Ok(ContainerId::new(config.name.clone()))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.record(format!("start {id}"));
        let mut state = self.state.lock();
        if state.failing_starts.contains(id.as_str()) {
            return Err(ContainerError::Runtime(format!("{id} failed to start")));
        }
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.running = true;
        state.observe();
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        self.record(format!("stop {id}"));
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if !container.running {
            return Err(ContainerError::NotRunning(id.to_string()));
        }
        container.running = false;
        state.observe();
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> Result<(), ContainerError> {
        self.record(format!("remove {id}"));
        let mut state = self.state.lock();
        state
            .containers
            .remove(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        state.observe();
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let state = self.state.lock();
        let container = state
            .containers
            .get(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        Ok(ContainerInfo {
            id: id.clone(),
            name: id.to_string(),
            image: container.image.clone(),
            state: if container.running {
                ContainerState::Running
            } else {
                ContainerState::Exited
            },
            labels: container.labels.clone(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| filters.all || c.running)
            .filter(|(name, _)| filters.name.as_ref().is_none_or(|n| name.contains(n.as_str())))
            .filter(|(_, c)| {
                filters
                    .labels
                    .iter()
                    .all(|(k, v)| c.labels.get(k) == Some(v))
            })
            .map(|(name, c)| ContainerSummary {
                id: ContainerId::new(name.clone()),
                name: name.clone(),
                image: c.image.clone(),
                state: if c.running {
                    ContainerState::Running
                } else {
                    ContainerState::Exited
                },
                status: String::new(),
                labels: c.labels.clone(),
            })
            .collect())
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        self.record(format!("wait {id}"));
        let mut state = self.state.lock();
        let code = state.wait_exit_code;
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.running = false;
        Ok(code)
    }
}

#[async_trait]
impl ExecOps for ScriptedRuntime {
    async fn exec(
        &self,
        container: &ContainerId,
        config: &ExecConfig,
    ) -> Result<ExecResult, ExecError> {
        self.record(format!("exec {} {}", container, config.cmd.join(" ")));
        let state = self.state.lock();
        match state.containers.get(container.as_str()) {
            None => return Err(ExecError::ContainerNotFound(container.to_string())),
            Some(c) if !c.running => {
                return Err(ExecError::ContainerNotRunning(container.to_string()));
            }
            Some(_) => {}
        }
        Ok(state
            .exec_results
            .get(container.as_str())
            .cloned()
            .unwrap_or(ExecResult {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
            }))
    }
}

#[async_trait]
impl ArchiveOps for ScriptedRuntime {
    async fn copy_from_container(
        &self,
        container: &ContainerId,
        path: &str,
    ) -> Result<Vec<u8>, ArchiveError> {
        self.record(format!("copy {container}:{path}"));
        match self.state.lock().archives.get(path) {
            Some(ArchiveScript::Bytes(bytes)) => Ok(bytes.clone()),
            Some(ArchiveScript::Denied) => Err(ArchiveError::PermissionDenied(path.to_string())),
            None => Err(ArchiveError::PathNotFound(path.to_string())),
        }
    }
}

#[async_trait]
impl NetworkOps for ScriptedRuntime {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        self.record(format!("network {}", config.name));
        let mut state = self.state.lock();
        if !state.networks.insert(config.name.clone()) {
            return Err(NetworkError::AlreadyExists(config.name.clone()));
        }
        Ok(NetworkId::new(config.name.clone()))
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        self.record(format!("inspect network {name}"));
        Ok(self.state.lock().networks.contains(name))
    }
}

/// Labels for a seeded primary replica.
pub(crate) fn replica_labels(stack: &str, service: &str, index: u32) -> HashMap<String, String> {
    HashMap::from([
        (labels::MANAGED.to_string(), "true".to_string()),
        (labels::STACK.to_string(), stack.to_string()),
        (labels::SERVICE.to_string(), service.to_string()),
        (labels::ROLE.to_string(), "primary".to_string()),
        (labels::REPLICA.to_string(), index.to_string()),
    ])
}

/// Build a tar archive holding a single file, as the copy endpoint returns.
pub(crate) fn tar_with_file(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, contents)
        .expect("append to in-memory tar");
    builder.into_inner().expect("finish in-memory tar")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_not_counted_as_downtime() {
        let runtime = ScriptedRuntime::new();
        for i in 1..=3 {
            runtime.seed(
                &format!("shop-api-{i}"),
                "ghcr.io/acme/api:v1",
                replica_labels("shop", "api", i),
            );
        }
        assert_eq!(runtime.min_running("api"), None);
    }

    #[tokio::test]
    async fn stopping_one_of_three_records_two_running() {
        let runtime = ScriptedRuntime::new();
        for i in 1..=3 {
            runtime.seed(
                &format!("shop-api-{i}"),
                "ghcr.io/acme/api:v1",
                replica_labels("shop", "api", i),
            );
        }
        let id = ContainerId::new("shop-api-1");
        runtime
            .stop_container(&id, Duration::from_secs(1))
            .await
            .unwrap();
        runtime.start_container(&id).await.unwrap();
        assert_eq!(runtime.min_running("api"), Some(2));
    }
}
