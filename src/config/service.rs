// ABOUTME: Primary service, supporting service and artifact declarations.
// ABOUTME: Artifacts accept a bare repository string or a detailed entry.

use super::deserialize::{deserialize_image_ref, deserialize_service_name};
use super::{EnvValue, RestartPolicy, StopConfig};
use crate::types::{ImageRef, ServiceName, Version};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryConfig {
    #[serde(deserialize_with = "deserialize_service_name")]
    pub name: ServiceName,

    /// Image repository; the release version becomes the tag.
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub stop: StopConfig,

    #[serde(default)]
    pub resources: Option<ResourcesConfig>,
}

fn default_replicas() -> u32 {
    1
}

impl PrimaryConfig {
    pub fn new(name: ServiceName, image: ImageRef) -> Self {
        PrimaryConfig {
            name,
            image,
            replicas: default_replicas(),
            ports: Vec::new(),
            volumes: Vec::new(),
            env: HashMap::new(),
            labels: HashMap::new(),
            command: None,
            restart: RestartPolicy::default(),
            stop: StopConfig::default(),
            resources: None,
        }
    }

    /// Whether any port publishes to a fixed host port.
    pub fn has_host_port_bindings(&self) -> bool {
        self.ports.iter().any(|p| {
            let port_part = p.split('/').next().unwrap_or(p);
            port_part.contains(':')
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
    pub memory: Option<String>,
    pub cpus: Option<String>,
}

/// Auxiliary service refreshed best-effort after rollout.
#[derive(Debug, Clone, Deserialize)]
pub struct SupportingConfig {
    #[serde(deserialize_with = "deserialize_service_name")]
    pub name: ServiceName,

    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    /// Own health endpoint, checked as an optional dependency.
    #[serde(default)]
    pub health_url: Option<String>,

    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// An extra image fetched alongside the primary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub image: ImageRef,
    /// Tagged with the release version when true.
    pub versioned: bool,
}

impl Artifact {
    /// The concrete reference to pull for a release.
    pub fn reference(&self, version: &Version) -> ImageRef {
        if self.versioned {
            self.image.with_tag(version)
        } else {
            self.image.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum ArtifactEntry {
    Simple(String),
    Detailed {
        image: String,
        #[serde(default = "default_versioned")]
        versioned: bool,
    },
}

fn default_versioned() -> bool {
    true
}

impl ArtifactEntry {
    pub(super) fn into_artifact(self) -> Result<Artifact, String> {
        let (image, versioned) = match self {
            ArtifactEntry::Simple(s) => (s, true),
            ArtifactEntry::Detailed { image, versioned } => (image, versioned),
        };
        let image = ImageRef::parse(&image).map_err(|e| e.to_string())?;
        if !versioned && !image.is_pinned() {
            return Err(format!("unversioned artifact {image} needs an explicit tag"));
        }
        Ok(Artifact { image, versioned })
    }
}
