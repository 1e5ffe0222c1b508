// ABOUTME: What a session deploys: manifest, target version and environment values.
// ABOUTME: Builds container configurations for replicas, migrations and supporting services.

use super::error::DeployError;
use crate::config::{EnvFile, Manifest, SupportingConfig, resolve_env_map};
use crate::runtime::{
    ContainerConfig, PortMapping, Protocol, ResourceLimits, RestartPolicyConfig, VolumeMount,
    labels,
};
use crate::types::{ImageRef, Version};
use std::collections::HashMap;
use std::path::Path;

pub const ROLE_PRIMARY: &str = "primary";
pub const ROLE_SUPPORTING: &str = "supporting";
pub const ROLE_MIGRATION: &str = "migration";

#[derive(Debug, Clone)]
pub struct ReleasePlan {
    pub manifest: Manifest,
    pub version: Version,
    pub environment: String,
    pub env: EnvFile,
}

impl ReleasePlan {
    pub fn new(manifest: Manifest, version: Version, environment: impl Into<String>) -> Self {
        Self {
            manifest,
            version,
            environment: environment.into(),
            env: EnvFile::default(),
        }
    }

    pub fn with_env(mut self, env: EnvFile) -> Self {
        self.env = env;
        self
    }

    /// Primary image tagged with the target version.
    pub fn primary_image(&self) -> ImageRef {
        self.manifest.primary.image.with_tag(&self.version)
    }

    /// Every image the release needs, primary first.
    pub fn images(&self) -> Vec<ImageRef> {
        std::iter::once(self.primary_image())
            .chain(
                self.manifest
                    .artifacts
                    .iter()
                    .map(|a| a.reference(&self.version)),
            )
            .collect()
    }

    fn base_labels(&self, service: &str, role: &str) -> HashMap<String, String> {
        HashMap::from([
            (labels::MANAGED.to_string(), "true".to_string()),
            (labels::STACK.to_string(), self.manifest.stack.to_string()),
            (labels::SERVICE.to_string(), service.to_string()),
            (labels::ROLE.to_string(), role.to_string()),
        ])
    }

    fn primary_env(&self) -> Result<HashMap<String, String>, DeployError> {
        Ok(resolve_env_map(&self.manifest.primary.env, &self.env)?)
    }

    /// Configuration for primary replica `index` (1-based) at `version`.
    pub fn replica_config(
        &self,
        index: u32,
        version: &Version,
    ) -> Result<ContainerConfig, DeployError> {
        let primary = &self.manifest.primary;

        let mut labels = primary.labels.clone();
        labels.extend(self.base_labels(primary.name.as_str(), ROLE_PRIMARY));
        labels.insert(labels::REPLICA.to_string(), index.to_string());
        labels.insert(labels::VERSION.to_string(), version.to_string());

        let resources = primary.resources.as_ref().map(|r| ResourceLimits {
            memory: r.memory.as_deref().and_then(parse_memory_string),
            cpus: r.cpus.as_deref().and_then(|c| c.parse().ok()),
        });

        Ok(ContainerConfig {
            name: self.manifest.replica_name(index),
            image: primary.image.with_tag(version),
            env: self.primary_env()?,
            labels,
            ports: primary
                .ports
                .iter()
                .filter_map(|p| parse_port_mapping(p))
                .collect(),
            volumes: self.volumes(&primary.volumes),
            command: primary.command.clone(),
            restart_policy: RestartPolicyConfig::from(&primary.restart),
            resources,
            stop_timeout: Some(primary.stop.timeout),
            network: Some(self.manifest.network_name()),
            network_aliases: vec![primary.name.as_alias()],
        })
    }

    /// One-off migration container of the target version.
    pub fn migration_config(&self, command: Vec<String>) -> Result<ContainerConfig, DeployError> {
        let primary = &self.manifest.primary;
        let mut labels = self.base_labels(primary.name.as_str(), ROLE_MIGRATION);
        labels.insert(labels::VERSION.to_string(), self.version.to_string());

        Ok(ContainerConfig {
            name: format!("{}-migrate-{}", self.manifest.stack, self.version),
            image: self.primary_image(),
            env: self.primary_env()?,
            labels,
            ports: Vec::new(),
            volumes: self.volumes(&primary.volumes),
            command: Some(command),
            restart_policy: RestartPolicyConfig::No,
            resources: None,
            stop_timeout: None,
            network: Some(self.manifest.network_name()),
            network_aliases: Vec::new(),
        })
    }

    pub fn supporting_config(&self, service: &SupportingConfig) -> ContainerConfig {
        ContainerConfig {
            name: self.manifest.supporting_name(&service.name),
            image: service.image.clone(),
            env: service.env.clone(),
            labels: self.base_labels(service.name.as_str(), ROLE_SUPPORTING),
            ports: service
                .ports
                .iter()
                .filter_map(|p| parse_port_mapping(p))
                .collect(),
            volumes: self.volumes(&service.volumes),
            command: service.command.clone(),
            restart_policy: RestartPolicyConfig::UnlessStopped,
            resources: None,
            stop_timeout: None,
            network: Some(self.manifest.network_name()),
            network_aliases: vec![service.name.as_alias()],
        }
    }

    fn volumes(&self, specs: &[String]) -> Vec<VolumeMount> {
        specs
            .iter()
            .filter_map(|v| parse_volume_mount(v, &self.manifest.root))
            .collect()
    }
}

/// Parse "source:target" or "source:target:ro". Relative host paths resolve
/// against the project root; named volumes pass through.
fn parse_volume_mount(spec: &str, root: &Path) -> Option<VolumeMount> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (source, target, read_only) = match parts.as_slice() {
        [source, target] => (*source, *target, false),
        [source, target, mode] => (*source, *target, *mode == "ro"),
        _ => return None,
    };

    let source = if source.starts_with('.') {
        root.join(source).display().to_string()
    } else {
        source.to_string()
    };

    Some(VolumeMount {
        source,
        target: target.to_string(),
        read_only,
    })
}

/// Parse "8080", "8080:80" or "8080:80/udp".
fn parse_port_mapping(spec: &str) -> Option<PortMapping> {
    let (port_part, protocol) = match spec.split_once('/') {
        Some((ports, "udp")) => (ports, Protocol::Udp),
        Some((ports, _)) => (ports, Protocol::Tcp),
        None => (spec, Protocol::Tcp),
    };

    let parts: Vec<&str> = port_part.split(':').collect();
    match parts.as_slice() {
        [container] => Some(PortMapping {
            host_port: None,
            container_port: container.parse().ok()?,
            protocol,
            host_ip: None,
        }),
        [host, container] => Some(PortMapping {
            host_port: Some(host.parse().ok()?),
            container_port: container.parse().ok()?,
            protocol,
            host_ip: None,
        }),
        [ip, host, container] => Some(PortMapping {
            host_port: Some(host.parse().ok()?),
            container_port: container.parse().ok()?,
            protocol,
            host_ip: Some(ip.to_string()),
        }),
        _ => None,
    }
}

/// Parse a memory string like "512m" or "1g" into bytes.
fn parse_memory_string(spec: &str) -> Option<u64> {
    let spec = spec.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = spec.strip_suffix('g') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('k') {
        (n, 1024)
    } else {
        (spec.as_str(), 1)
    };

    num_str.parse::<u64>().ok().map(|n| n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvValue;
    use std::path::PathBuf;

    const MANIFEST: &str = r#"
stack: shop
primary:
  name: api
  image: ghcr.io/acme/api
  replicas: 2
  ports: ["8000"]
  volumes: ["./uploads:/app/uploads", "shop-data:/data:ro"]
  env:
    MODE: release
    DB_URL:
      env: DB_URL
  resources:
    memory: 512m
    cpus: "0.5"
artifacts:
  - ghcr.io/acme/worker
supporting:
  - name: grafana
    image: grafana/grafana:10.2.0
health:
  endpoint: http://localhost:8000/health
"#;

    fn plan() -> ReleasePlan {
        let mut manifest = Manifest::from_yaml(MANIFEST).unwrap();
        manifest.root = PathBuf::from("/srv/shop");
        let env = EnvFile::from_values(HashMap::from([(
            "DB_URL".to_string(),
            "redis://redis:6379".to_string(),
        )]));
        ReleasePlan::new(manifest, Version::new("v1.2.3").unwrap(), "staging").with_env(env)
    }

    #[test]
    fn images_tag_primary_and_versioned_artifacts() {
        let images: Vec<String> = plan().images().iter().map(ToString::to_string).collect();
        assert_eq!(
            images,
            vec!["ghcr.io/acme/api:v1.2.3", "ghcr.io/acme/worker:v1.2.3"]
        );
    }

    #[test]
    fn replica_config_carries_labels_env_and_mounts() {
        let plan = plan();
        let config = plan.replica_config(2, &plan.version).unwrap();

        assert_eq!(config.name, "shop-api-2");
        assert_eq!(config.image.to_string(), "ghcr.io/acme/api:v1.2.3");
        assert_eq!(config.labels.get(labels::REPLICA), Some(&"2".to_string()));
        assert_eq!(config.labels.get(labels::VERSION), Some(&"v1.2.3".to_string()));
        assert_eq!(config.env.get("DB_URL"), Some(&"redis://redis:6379".to_string()));
        assert_eq!(config.env.get("MODE"), Some(&"release".to_string()));
        assert_eq!(config.volumes[0].source, "/srv/shop/./uploads");
        assert_eq!(config.volumes[1].source, "shop-data");
        assert!(config.volumes[1].read_only);
        assert_eq!(config.network.as_deref(), Some("shop-net"));
        assert_eq!(config.resources.as_ref().unwrap().memory, Some(512 * 1024 * 1024));
    }

    #[test]
    fn unresolvable_env_reference_is_a_config_error() {
        let mut plan = plan();
        plan.manifest.primary.env.insert(
            "MISSING".to_string(),
            EnvValue::FromEnv {
                var: "NOPE".to_string(),
                default: None,
            },
        );
        let err = plan.replica_config(1, &plan.version.clone()).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn migration_config_is_one_off() {
        let plan = plan();
        let config = plan
            .migration_config(vec!["./manage".into(), "migrate".into()])
            .unwrap();
        assert_eq!(config.name, "shop-migrate-v1.2.3");
        assert_eq!(config.restart_policy, RestartPolicyConfig::No);
        assert!(config.ports.is_empty());
        assert_eq!(config.labels.get(labels::ROLE), Some(&"migration".to_string()));
    }

    #[test]
    fn port_mapping_formats() {
        let p = parse_port_mapping("8080:80/udp").unwrap();
        assert_eq!(p.host_port, Some(8080));
        assert_eq!(p.container_port, 80);
        assert_eq!(p.protocol, Protocol::Udp);

        let p = parse_port_mapping("127.0.0.1:8080:80").unwrap();
        assert_eq!(p.host_ip.as_deref(), Some("127.0.0.1"));

        assert!(parse_port_mapping("abc").is_none());
    }

    #[test]
    fn memory_suffixes() {
        assert_eq!(parse_memory_string("1g"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory_string("64K"), Some(64 * 1024));
        assert_eq!(parse_memory_string("100"), Some(100));
        assert_eq!(parse_memory_string("lots"), None);
    }
}
