// ABOUTME: Release manifest types and parsing for stagehand.yml.
// ABOUTME: Handles YAML parsing, discovery, validation and per-environment merging.

mod checks;
mod datastore;
mod deserialize;
mod env_file;
mod env_value;
mod error;
mod health;
mod restart_policy;
mod service;
mod stop;

pub use checks::{CheckConfig, NotificationConfig, PreflightConfig, SmokeConfig, VerificationConfig};
pub use datastore::{DatastoreConfig, MigrationConfig};
pub use env_file::EnvFile;
pub use env_value::{EnvValue, resolve_env_map};
pub use error::ConfigError;
pub use health::{Budget, HealthConfig};
pub use restart_policy::RestartPolicy;
pub use service::{Artifact, PrimaryConfig, ResourcesConfig, SupportingConfig};
pub use stop::StopConfig;

use crate::runtime::RuntimeConfig;
use crate::types::ServiceName;
use deserialize::{deserialize_artifacts, deserialize_service_name};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILENAME: &str = "stagehand.yml";
pub const MANIFEST_FILENAME_ALT: &str = "stagehand.yaml";
pub const MANIFEST_FILENAME_DIR: &str = ".stagehand/config.yml";

pub const DEFAULT_ENVIRONMENT: &str = "production";

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Prefix for container names, labels and the stack network.
    #[serde(deserialize_with = "deserialize_service_name")]
    pub stack: ServiceName,

    pub primary: PrimaryConfig,

    #[serde(default, deserialize_with = "deserialize_artifacts")]
    pub artifacts: Vec<Artifact>,

    #[serde(default)]
    pub datastore: Option<DatastoreConfig>,

    #[serde(default)]
    pub migrations: Option<MigrationConfig>,

    #[serde(default)]
    pub supporting: Vec<SupportingConfig>,

    #[serde(default)]
    pub paths: PathsConfig,

    pub health: HealthConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub preflight: PreflightConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub runtime: Option<RuntimeConfig>,

    #[serde(default)]
    pub environments: HashMap<String, EnvironmentOverride>,

    /// Directory the manifest was discovered in; relative paths resolve here.
    #[serde(skip)]
    pub root: PathBuf,
}

/// Host directories, relative to the project root unless absolute.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("config")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            config_dir: default_config_dir(),
            log_dir: default_log_dir(),
            backup_dir: default_backup_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnvironmentOverride {
    #[serde(default)]
    pub replicas: Option<u32>,

    #[serde(default)]
    pub health_endpoint: Option<String>,

    #[serde(default)]
    pub ports: Option<Vec<String>>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub checks: Option<Vec<CheckConfig>>,

    #[serde(default)]
    pub smoke_url: Option<String>,
}

impl Manifest {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [
            dir.join(MANIFEST_FILENAME),
            dir.join(MANIFEST_FILENAME_ALT),
            dir.join(MANIFEST_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                let mut manifest = Self::load(path)?;
                manifest.root = dir.to_path_buf();
                return Ok(manifest);
            }
        }

        Err(ConfigError::NotFound(dir.to_path_buf()))
    }

    /// Apply an environment's overrides. Environments without an entry use
    /// the base manifest unchanged.
    pub fn for_environment(&self, name: &str) -> Result<Manifest, ConfigError> {
        let mut merged = self.clone();

        let Some(over) = self.environments.get(name) else {
            tracing::debug!(environment = name, "no overrides declared, using base manifest");
            return Ok(merged);
        };

        if let Some(replicas) = over.replicas {
            merged.primary.replicas = replicas;
        }

        if let Some(ref endpoint) = over.health_endpoint {
            merged.health.endpoint = endpoint.clone();
        }

        // Replace ports if specified
        if let Some(ref ports) = over.ports {
            merged.primary.ports = ports.clone();
        }

        // Deep merge env
        for (k, v) in &over.env {
            merged.primary.env.insert(k.clone(), v.clone());
        }

        if let Some(ref checks) = over.checks {
            merged.verification.checks = checks.clone();
        }

        if let Some(ref url) = over.smoke_url
            && let Some(ref mut smoke) = merged.verification.smoke
        {
            smoke.url = url.clone();
        }

        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary.replicas > 1 && self.primary.has_host_port_bindings() {
            return Err(ConfigError::Invalid(format!(
                "{} declares {} replicas but binds fixed host ports; replicas cannot share a host port",
                self.primary.name, self.primary.replicas
            )));
        }

        for (name, budget) in [("rollout", &self.health.rollout), ("verify", &self.health.verify)] {
            if budget.attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "health.{name}.attempts must be at least 1"
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for service in &self.supporting {
            if service.name == self.primary.name || !seen.insert(service.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate service name: {}",
                    service.name
                )));
            }
        }

        Ok(())
    }

    /// Resolve a manifest path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.resolve(&self.paths.config_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.paths.log_dir)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.resolve(&self.paths.backup_dir)
    }

    /// Name of the network replicas and the data store share.
    pub fn network_name(&self) -> String {
        format!("{}-net", self.stack)
    }

    /// Container name of a primary replica (1-based).
    pub fn replica_name(&self, index: u32) -> String {
        format!("{}-{}-{}", self.stack, self.primary.name, index)
    }

    /// Container name of a supporting service.
    pub fn supporting_name(&self, service: &ServiceName) -> String {
        format!("{}-{}", self.stack, service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
stack: shop
primary:
  name: api
  image: ghcr.io/acme/api
  replicas: 3
  ports: ["8000"]
health:
  endpoint: http://localhost:8000/health
environments:
  staging:
    replicas: 1
    health_endpoint: http://localhost:9000/health
"#;

    #[test]
    fn minimal_manifest_gets_defaults() {
        let manifest = Manifest::from_yaml(MINIMAL).unwrap();
        assert_eq!(manifest.health.rollout, Budget::rollout());
        assert_eq!(manifest.health.verify, Budget::verify());
        assert_eq!(manifest.health.token, "healthy");
        assert_eq!(manifest.preflight.min_free_disk_gib, 5);
        assert_eq!(manifest.preflight.credential_key, "API_KEY");
        assert_eq!(manifest.paths.backup_dir, PathBuf::from("backups"));
        assert_eq!(manifest.replica_name(2), "shop-api-2");
        assert_eq!(manifest.network_name(), "shop-net");
    }

    #[test]
    fn environment_override_merges_over_base() {
        let manifest = Manifest::from_yaml(MINIMAL).unwrap();
        let staging = manifest.for_environment("staging").unwrap();
        assert_eq!(staging.primary.replicas, 1);
        assert_eq!(staging.health.endpoint, "http://localhost:9000/health");
        assert_eq!(staging.primary.image.to_string(), "ghcr.io/acme/api");
    }

    #[test]
    fn unknown_environment_uses_base() {
        let manifest = Manifest::from_yaml(MINIMAL).unwrap();
        let production = manifest.for_environment("production").unwrap();
        assert_eq!(production.primary.replicas, 3);
    }

    #[test]
    fn replicas_with_host_ports_are_rejected() {
        let yaml = MINIMAL.replace("[\"8000\"]", "[\"80:8000\"]");
        assert!(matches!(
            Manifest::from_yaml(&yaml),
            Err(ConfigError::Invalid(msg)) if msg.contains("host port")
        ));
    }

    #[test]
    fn discover_prefers_primary_filename_and_sets_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILENAME), MINIMAL).unwrap();
        let manifest = Manifest::discover(dir.path()).unwrap();
        assert_eq!(manifest.root, dir.path());
        assert_eq!(manifest.backup_dir(), dir.path().join("backups"));
    }

    #[test]
    fn discover_reports_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Manifest::discover(dir.path()),
            Err(ConfigError::NotFound(_))
        ));
    }
}
