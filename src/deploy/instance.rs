// ABOUTME: Service instances touched during a session and their last known health.
// ABOUTME: Kept in memory for the final status snapshot; never persisted.

use crate::runtime::{ContainerSummary, labels};
use crate::types::ContainerId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    Primary,
    Supporting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInstance {
    pub id: ContainerId,
    pub service: String,
    pub role: InstanceRole,
    pub version: Option<String>,
    pub health: HealthStatus,
    pub last_checked: Option<DateTime<Utc>>,
}

impl ServiceInstance {
    pub fn new(id: ContainerId, service: &str, role: InstanceRole) -> Self {
        Self {
            id,
            service: service.to_string(),
            role,
            version: None,
            health: HealthStatus::Unknown,
            last_checked: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn mark(&mut self, health: HealthStatus) {
        self.health = health;
        self.last_checked = Some(Utc::now());
    }

    /// Build from a listed container using its stagehand labels.
    pub fn from_summary(summary: &ContainerSummary) -> Self {
        let role = match summary.labels.get(labels::ROLE).map(String::as_str) {
            Some("supporting") => InstanceRole::Supporting,
            _ => InstanceRole::Primary,
        };
        let service = summary
            .labels
            .get(labels::SERVICE)
            .cloned()
            .unwrap_or_else(|| summary.name.clone());
        Self {
            id: ContainerId::new(summary.name.clone()),
            service,
            role,
            version: summary.labels.get(labels::VERSION).cloned(),
            health: HealthStatus::Unknown,
            last_checked: None,
        }
    }
}

/// Instances keyed by container, in the order they were first seen.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct InstanceTable {
    instances: Vec<ServiceInstance>,
}

impl InstanceTable {
    pub fn upsert(&mut self, instance: ServiceInstance) {
        match self.instances.iter_mut().find(|i| i.id == instance.id) {
            Some(existing) => *existing = instance,
            None => self.instances.push(instance),
        }
    }

    /// Mark every instance with a role.
    pub fn mark_role(&mut self, role: InstanceRole, health: HealthStatus) {
        for instance in self.instances.iter_mut().filter(|i| i.role == role) {
            instance.mark(health);
        }
    }

    pub fn get(&self, id: &ContainerId) -> Option<&ServiceInstance> {
        self.instances.iter().find(|i| &i.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceInstance> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ServiceInstance> {
        self.instances.clone()
    }
}
