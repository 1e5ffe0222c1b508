// ABOUTME: Custom serde deserializers for manifest types.
// ABOUTME: Handles service names, image refs and artifact lists.

use serde::Deserialize;

use super::service::{Artifact, ArtifactEntry};
use crate::types::{ImageRef, ServiceName};

pub fn deserialize_service_name<'de, D>(deserializer: D) -> Result<ServiceName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ServiceName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_artifacts<'de, D>(deserializer: D) -> Result<Vec<Artifact>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<ArtifactEntry> = Vec::deserialize(deserializer)?;
    values
        .into_iter()
        .map(|entry| entry.into_artifact())
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)
}
